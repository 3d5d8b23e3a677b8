/// Core workflow type definitions
///
/// A workflow is a set of typed nodes plus the edges ordering them. Definitions
/// are stored as JSON; node configs follow the `node.data` contract
/// (`{"type": "job-source", "sourceId": ..., "metadata": {...}}`) and are
/// compiled into [`NodeSpec`] while deserializing, so a saved workflow always
/// carries already-parsed filter criteria.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::runtime::sorter;
use crate::workflow::filter::{FilterCriteria, FilterParseError};

/// Publication state of a workflow definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    #[default]
    Draft,
    Published,
}

/// Recurring trigger vocabulary. Every rule is evaluated in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScheduleTag {
    #[serde(rename = "daily-9am")]
    Daily9am,
    #[serde(rename = "daily-6pm")]
    Daily6pm,
    #[serde(rename = "weekly")]
    Weekly,
}

impl ScheduleTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily9am => "daily-9am",
            Self::Daily6pm => "daily-6pm",
            Self::Weekly => "weekly",
        }
    }

    /// Six-field cron expression (sec min hour dom month dow).
    pub fn cron_expression(&self) -> &'static str {
        match self {
            Self::Daily9am => "0 0 9 * * *",
            Self::Daily6pm => "0 0 18 * * *",
            Self::Weekly => "0 0 9 * * Mon",
        }
    }
}

impl fmt::Display for ScheduleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily-9am" => Ok(Self::Daily9am),
            "daily-6pm" => Ok(Self::Daily6pm),
            "weekly" => Ok(Self::Weekly),
            other => Err(format!("unknown schedule '{}'", other)),
        }
    }
}

/// A complete workflow definition and its activation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique workflow identifier
    pub id: String,
    /// Human-readable workflow name
    pub name: String,
    /// User the workflow runs on behalf of; at most one run per user at a time
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub status: WorkflowStatus,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub schedule: Option<ScheduleTag>,
    #[serde(default)]
    pub activated_at: Option<DateTime<Utc>>,
    /// End of the activation window (exclusive)
    #[serde(default)]
    pub deactivates_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub run_count: u64,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Workflow {
    /// Has the activation window elapsed at `now`?
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.deactivates_at.map_or(false, |end| end <= now)
    }

    pub fn is_published(&self) -> bool {
        self.status == WorkflowStatus::Published
    }

    /// Eligible for a recurring trigger: published, active, unexpired and scheduled.
    pub fn is_schedulable_at(&self, now: DateTime<Utc>) -> bool {
        self.is_published() && self.is_active && !self.is_expired_at(now) && self.schedule.is_some()
    }

    /// Structural checks run before a definition is saved.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::MissingId);
        }

        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(ValidationError::DuplicateNode(node.id.clone()));
            }
        }

        for edge in &self.edges {
            for end in [&edge.source, &edge.target] {
                if !ids.contains(end.as_str()) {
                    return Err(ValidationError::UnknownEdgeNode(end.clone()));
                }
            }
        }

        let sorted = sorter::sort(&self.nodes, &self.edges);
        if !sorted.excluded.is_empty() {
            return Err(ValidationError::Cycle(sorted.excluded));
        }

        Ok(())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("workflow id must not be empty")]
    MissingId,
    #[error("duplicate node id '{0}'")]
    DuplicateNode(String),
    #[error("edge references unknown node '{0}'")]
    UnknownEdgeNode(String),
    #[error("graph contains a cycle through nodes {0:?}")]
    Cycle(Vec<String>),
}

/// A single node in the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique node identifier within the workflow
    pub id: String,
    /// Typed configuration, from the `data` object
    pub data: NodeSpec,
}

impl Node {
    pub fn new(id: impl Into<String>, data: NodeSpec) -> Self {
        Self { id: id.into(), data }
    }
}

/// Connection between two nodes; the source runs before the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(alias = "from")]
    pub source: String,
    #[serde(alias = "to")]
    pub target: String,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// The five node kinds, each with its own typed configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "NodeData", into = "NodeData")]
pub enum NodeSpec {
    /// Entry point; marks the run as started
    Trigger,
    /// Scrape one job source
    Source(SourceConfig),
    /// Clean, dedupe and re-sort the job list
    Normalize(NormalizeConfig),
    /// Drop jobs not matching the criteria
    Filter(FilterCriteria),
    /// Deliver the job list to recipients
    Notify(NotifyConfig),
}

impl NodeSpec {
    pub const TRIGGER: &'static str = "trigger";
    pub const SOURCE: &'static str = "job-source";
    pub const NORMALIZE: &'static str = "normalize-data";
    pub const FILTER: &'static str = "filter";
    pub const NOTIFY: &'static str = "daily-email";

    /// Wire tag of this node kind.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Trigger => Self::TRIGGER,
            Self::Source(_) => Self::SOURCE,
            Self::Normalize(_) => Self::NORMALIZE,
            Self::Filter(_) => Self::FILTER,
            Self::Notify(_) => Self::NOTIFY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceConfig {
    /// Required at run time; a missing id fails the run as misconfigured
    pub source_id: Option<String>,
    pub keywords: String,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeConfig {
    pub dedupe: bool,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self { dedupe: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NotifyConfig {
    /// Comma-separated addresses
    pub recipients: String,
}

impl NotifyConfig {
    pub fn recipient_list(&self) -> Vec<String> {
        self.recipients
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum NodeSpecError {
    #[error("unknown node type '{0}'")]
    UnknownType(String),
    #[error(transparent)]
    Filter(#[from] FilterParseError),
}

/// Wire shape of `node.data`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeData {
    #[serde(rename = "type")]
    node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_id: Option<String>,
    #[serde(default)]
    metadata: NodeMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    keywords: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filters: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    recipients: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dedupe: Option<bool>,
}

impl TryFrom<NodeData> for NodeSpec {
    type Error = NodeSpecError;

    fn try_from(data: NodeData) -> Result<Self, Self::Error> {
        let meta = data.metadata;
        match data.node_type.as_str() {
            Self::TRIGGER => Ok(Self::Trigger),
            Self::SOURCE => Ok(Self::Source(SourceConfig {
                source_id: data.source_id.filter(|id| !id.trim().is_empty()),
                keywords: meta.keywords.unwrap_or_default(),
                location: meta.location.unwrap_or_default(),
            })),
            Self::NORMALIZE => Ok(Self::Normalize(NormalizeConfig {
                dedupe: meta.dedupe.unwrap_or(true),
            })),
            Self::FILTER => {
                let rules = meta.filters.unwrap_or_default();
                Ok(Self::Filter(FilterCriteria::parse(rules.as_slice())?))
            }
            Self::NOTIFY => Ok(Self::Notify(NotifyConfig {
                recipients: meta.recipients.unwrap_or_default(),
            })),
            other => Err(NodeSpecError::UnknownType(other.to_string())),
        }
    }
}

impl From<NodeSpec> for NodeData {
    fn from(spec: NodeSpec) -> Self {
        let node_type = spec.type_tag().to_string();
        match spec {
            NodeSpec::Trigger => NodeData {
                node_type,
                ..Default::default()
            },
            NodeSpec::Source(config) => NodeData {
                node_type,
                source_id: config.source_id,
                metadata: NodeMetadata {
                    keywords: Some(config.keywords),
                    location: Some(config.location),
                    ..Default::default()
                },
            },
            NodeSpec::Normalize(config) => NodeData {
                node_type,
                source_id: None,
                metadata: NodeMetadata {
                    dedupe: Some(config.dedupe),
                    ..Default::default()
                },
            },
            NodeSpec::Filter(criteria) => NodeData {
                node_type,
                source_id: None,
                metadata: NodeMetadata {
                    filters: Some(criteria.rules().to_vec()),
                    ..Default::default()
                },
            },
            NodeSpec::Notify(config) => NodeData {
                node_type,
                source_id: None,
                metadata: NodeMetadata {
                    recipients: Some(config.recipients),
                    ..Default::default()
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definition() -> serde_json::Value {
        json!({
            "id": "wf-daily",
            "name": "Daily engineers",
            "owner_id": "user-1",
            "status": "published",
            "is_active": true,
            "schedule": "daily-9am",
            "nodes": [
                {"id": "t", "data": {"type": "trigger"}},
                {"id": "s", "data": {"type": "job-source", "sourceId": "linkedin",
                    "metadata": {"keywords": "engineer", "location": "Remote"}}},
                {"id": "n", "data": {"type": "normalize-data"}},
                {"id": "f", "data": {"type": "filter", "metadata": {"filters": ["Title: engineer"]}}},
                {"id": "e", "data": {"type": "daily-email", "metadata": {"recipients": "a@b.com, c@d.com"}}}
            ],
            "edges": [
                {"source": "t", "target": "s"},
                {"source": "s", "target": "n"},
                {"from": "n", "to": "f"},
                {"source": "f", "target": "e"}
            ]
        })
    }

    #[test]
    fn node_data_contract_is_typed() {
        let workflow: Workflow = serde_json::from_value(definition()).unwrap();
        assert_eq!(workflow.schedule, Some(ScheduleTag::Daily9am));
        assert!(workflow.validate().is_ok());

        match &workflow.nodes[1].data {
            NodeSpec::Source(config) => {
                assert_eq!(config.source_id.as_deref(), Some("linkedin"));
                assert_eq!(config.keywords, "engineer");
            }
            other => panic!("unexpected node {:?}", other),
        }
        assert_eq!(workflow.nodes[2].data, NodeSpec::Normalize(NormalizeConfig { dedupe: true }));
        match &workflow.nodes[3].data {
            NodeSpec::Filter(criteria) => assert_eq!(criteria.titles, vec!["engineer"]),
            other => panic!("unexpected node {:?}", other),
        }
        match &workflow.nodes[4].data {
            NodeSpec::Notify(config) => assert_eq!(config.recipient_list(), vec!["a@b.com", "c@d.com"]),
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn definition_survives_storage_round_trip() {
        let workflow: Workflow = serde_json::from_value(definition()).unwrap();
        let stored = serde_json::to_string(&workflow).unwrap();
        let reloaded: Workflow = serde_json::from_str(&stored).unwrap();
        assert_eq!(reloaded.nodes[3].data, workflow.nodes[3].data);
        assert_eq!(reloaded.edges[2], Edge::new("n", "f"));
    }

    #[test]
    fn unknown_types_and_bad_filters_are_rejected() {
        let unknown = json!({"id": "x", "data": {"type": "send-fax"}});
        let err = serde_json::from_value::<Node>(unknown).unwrap_err();
        assert!(err.to_string().contains("unknown node type"));

        let bad_filter = json!({"id": "f", "data": {"type": "filter", "metadata": {"filters": ["Colour: red"]}}});
        assert!(serde_json::from_value::<Node>(bad_filter).is_err());
    }

    #[test]
    fn validation_catches_broken_graphs() {
        let mut workflow: Workflow = serde_json::from_value(definition()).unwrap();
        workflow.edges.push(Edge::new("e", "ghost"));
        assert_eq!(workflow.validate(), Err(ValidationError::UnknownEdgeNode("ghost".into())));

        workflow.edges.pop();
        workflow.edges.push(Edge::new("e", "s"));
        assert!(matches!(workflow.validate(), Err(ValidationError::Cycle(_))));
    }

    #[test]
    fn expiry_and_schedulability() {
        let mut workflow: Workflow = serde_json::from_value(definition()).unwrap();
        let now = Utc::now();
        assert!(workflow.is_schedulable_at(now));

        workflow.deactivates_at = Some(now - chrono::Duration::minutes(1));
        assert!(workflow.is_expired_at(now));
        assert!(!workflow.is_schedulable_at(now));

        workflow.deactivates_at = None;
        workflow.status = WorkflowStatus::Draft;
        assert!(!workflow.is_schedulable_at(now));
    }

    #[test]
    fn schedule_tags_map_to_cron() {
        assert_eq!("weekly".parse::<ScheduleTag>().unwrap().cron_expression(), "0 0 9 * * Mon");
        assert_eq!(ScheduleTag::Daily6pm.to_string(), "daily-6pm");
        assert!("hourly".parse::<ScheduleTag>().is_err());
    }
}
