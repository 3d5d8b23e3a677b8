/// Execution records and the in-flight run context
///
/// [`Execution`] and [`NodeLog`] are what gets persisted; [`ExecutionContext`]
/// is the ephemeral state one run threads through its node handlers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::scraper::JobRecord;

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggeredBy {
    Schedule,
    #[default]
    Manual,
    Api,
}

/// Lifecycle of a persisted run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Lifecycle of a single node inside a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

macro_rules! string_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(anyhow::anyhow!("invalid {} '{}'", stringify!($ty), other)),
                }
            }
        }
    };
}

string_enum!(TriggeredBy { Schedule => "schedule", Manual => "manual", Api => "api" });
string_enum!(ExecutionStatus {
    Pending => "pending",
    Running => "running",
    Completed => "completed",
    Failed => "failed",
});
string_enum!(NodeStatus {
    Pending => "pending",
    Running => "running",
    Completed => "completed",
    Failed => "failed",
});

/// Per-node trail entry with before/after job counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeLog {
    pub node_id: String,
    pub node_type: String,
    pub status: NodeStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub input_count: usize,
    pub output_count: usize,
    pub error: Option<String>,
}

impl NodeLog {
    pub fn start(node_id: &str, node_type: &str, input_count: usize) -> Self {
        Self {
            node_id: node_id.to_string(),
            node_type: node_type.to_string(),
            status: NodeStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            input_count,
            output_count: input_count,
            error: None,
        }
    }

    pub fn complete(&mut self, output_count: usize) {
        self.status = NodeStatus::Completed;
        self.output_count = output_count;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, output_count: usize, error: impl Into<String>) {
        self.status = NodeStatus::Failed;
        self.output_count = output_count;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }
}

/// A persisted run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// `completed_at - started_at`, in milliseconds
    pub duration_ms: Option<i64>,
    pub node_logs: Vec<NodeLog>,
    pub jobs_scraped: usize,
    pub jobs_filtered: usize,
    pub error: Option<String>,
    pub triggered_by: TriggeredBy,
}

impl Execution {
    /// Fresh `running` row with a new id.
    pub fn running(workflow_id: &str, triggered_by: TriggeredBy) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workflow_id: workflow_id.to_string(),
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            node_logs: Vec::new(),
            jobs_scraped: 0,
            jobs_filtered: 0,
            error: None,
            triggered_by,
        }
    }

    /// Apply a terminal outcome; only a `running` row changes.
    pub fn finish(&mut self, outcome: &RunOutcome) -> bool {
        if self.status != ExecutionStatus::Running {
            return false;
        }
        self.status = outcome.status;
        self.error = outcome.error.clone();
        self.jobs_scraped = outcome.jobs_scraped;
        self.jobs_filtered = outcome.jobs_filtered;
        self.completed_at = Some(outcome.completed_at);
        self.duration_ms = Some((outcome.completed_at - self.started_at).num_milliseconds());
        true
    }
}

/// Terminal state handed to `ExecutionStore::finalize`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub status: ExecutionStatus,
    pub error: Option<String>,
    pub jobs_scraped: usize,
    pub jobs_filtered: usize,
    pub completed_at: DateTime<Utc>,
}

impl RunOutcome {
    pub fn completed(jobs_scraped: usize, jobs_filtered: usize) -> Self {
        Self {
            status: ExecutionStatus::Completed,
            error: None,
            jobs_scraped,
            jobs_filtered,
            completed_at: Utc::now(),
        }
    }

    pub fn failed(error: impl Into<String>, jobs_scraped: usize, jobs_filtered: usize) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            error: Some(error.into()),
            jobs_scraped,
            jobs_filtered,
            completed_at: Utc::now(),
        }
    }
}

/// State carried through one run.
///
/// Owned by the engine for the lifetime of the run; handlers mutate `jobs`
/// and the engine appends to `logs`.
#[derive(Debug)]
pub struct ExecutionContext {
    pub workflow_id: String,
    pub execution_id: String,
    /// The in-flight job list
    pub jobs: Vec<JobRecord>,
    pub logs: Vec<NodeLog>,
    /// Records removed by filter nodes so far
    pub jobs_filtered: usize,
    pub started_at: DateTime<Utc>,
    /// Checked between nodes only
    pub cancel: CancellationToken,
}

impl ExecutionContext {
    pub fn new(workflow_id: &str, execution_id: &str, cancel: CancellationToken) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            execution_id: execution_id.to_string(),
            jobs: Vec::new(),
            logs: Vec::new(),
            jobs_filtered: 0,
            started_at: Utc::now(),
            cancel,
        }
    }
}
