/// SQLite adapter for workflows and executions
///
/// Workflows are stored as a JSON definition plus indexed columns. The
/// activation flag and run statistics live only in their columns and are
/// overlaid on the definition when loading, so `set_active` and `record_run`
/// are single-statement updates.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqlitePool, sqlite::SqliteRow, Row};

use crate::runtime::context::{Execution, ExecutionStatus, NodeLog, RunOutcome, TriggeredBy};
use crate::storage::{ExecutionStore, WorkflowStore};
use crate::workflow::Workflow;

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap a pool whose schema is already initialized.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn node_logs(&self, execution_id: &str) -> Result<Vec<NodeLog>> {
        let rows = sqlx::query(
            r#"
            SELECT node_id, node_type, status, started_at, completed_at, input_count, output_count, error
            FROM node_logs WHERE execution_id = ? ORDER BY id
            "#,
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(node_log_from_row).collect()
    }

    async fn execution_with_logs(&self, row: &SqliteRow) -> Result<Execution> {
        let mut execution = execution_from_row(row)?;
        execution.node_logs = self.node_logs(&execution.id).await?;
        Ok(execution)
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("invalid stored timestamp '{}'", raw))?
        .with_timezone(&Utc))
}

fn parse_optional(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_timestamp).transpose()
}

fn workflow_from_row(row: &SqliteRow) -> Result<Workflow> {
    let definition: String = row.try_get("definition")?;
    let mut workflow: Workflow = serde_json::from_str(&definition)
        .with_context(|| "stored workflow definition is not valid")?;

    workflow.is_active = row.try_get::<i64, _>("is_active")? != 0;
    workflow.last_run_at = parse_optional(row.try_get("last_run_at")?)?;
    workflow.run_count = row.try_get::<i64, _>("run_count")?.max(0) as u64;
    Ok(workflow)
}

fn execution_from_row(row: &SqliteRow) -> Result<Execution> {
    let status: String = row.try_get("status")?;
    let triggered_by: String = row.try_get("triggered_by")?;
    let started_at: String = row.try_get("started_at")?;

    Ok(Execution {
        id: row.try_get("id")?,
        workflow_id: row.try_get("workflow_id")?,
        status: status.parse()?,
        started_at: parse_timestamp(&started_at)?,
        completed_at: parse_optional(row.try_get("completed_at")?)?,
        duration_ms: row.try_get("duration_ms")?,
        node_logs: Vec::new(),
        jobs_scraped: row.try_get::<i64, _>("jobs_scraped")?.max(0) as usize,
        jobs_filtered: row.try_get::<i64, _>("jobs_filtered")?.max(0) as usize,
        error: row.try_get("error")?,
        triggered_by: triggered_by.parse()?,
    })
}

fn node_log_from_row(row: &SqliteRow) -> Result<NodeLog> {
    let status: String = row.try_get("status")?;
    let started_at: String = row.try_get("started_at")?;

    Ok(NodeLog {
        node_id: row.try_get("node_id")?,
        node_type: row.try_get("node_type")?,
        status: status.parse()?,
        started_at: parse_timestamp(&started_at)?,
        completed_at: parse_optional(row.try_get("completed_at")?)?,
        input_count: row.try_get::<i64, _>("input_count")?.max(0) as usize,
        output_count: row.try_get::<i64, _>("output_count")?.max(0) as usize,
        error: row.try_get("error")?,
    })
}

const WORKFLOW_COLUMNS: &str = "definition, is_active, last_run_at, run_count";
const EXECUTION_COLUMNS: &str = "id, workflow_id, status, triggered_by, started_at, completed_at, \
                                 duration_ms, jobs_scraped, jobs_filtered, error";

#[async_trait]
impl WorkflowStore for SqliteStore {
    async fn get_workflow(&self, id: &str) -> Result<Option<Workflow>> {
        let row = sqlx::query(&format!("SELECT {} FROM workflows WHERE id = ?", WORKFLOW_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(workflow_from_row).transpose()
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM workflows ORDER BY updated_at DESC, id",
            WORKFLOW_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(workflow_from_row).collect()
    }

    async fn save_workflow(&self, workflow: &Workflow) -> Result<()> {
        let definition_json = serde_json::to_string(workflow)?;

        sqlx::query(
            r#"
            INSERT INTO workflows
                (id, name, owner_id, status, is_active, schedule, deactivates_at,
                 last_run_at, run_count, definition, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                owner_id = excluded.owner_id,
                status = excluded.status,
                is_active = excluded.is_active,
                schedule = excluded.schedule,
                deactivates_at = excluded.deactivates_at,
                definition = excluded.definition,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&workflow.id)
        .bind(&workflow.name)
        .bind(&workflow.owner_id)
        .bind(if workflow.is_published() { "published" } else { "draft" })
        .bind(workflow.is_active as i64)
        .bind(workflow.schedule.map(|s| s.as_str()))
        .bind(workflow.deactivates_at.map(timestamp))
        .bind(workflow.last_run_at.map(timestamp))
        .bind(workflow.run_count as i64)
        .bind(&definition_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_workflow(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_active(&self, id: &str, active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE workflows SET is_active = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(active as i64)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_run(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE workflows SET last_run_at = ?, run_count = run_count + 1 WHERE id = ?")
            .bind(timestamp(at))
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl ExecutionStore for SqliteStore {
    async fn create_running(&self, workflow_id: &str, triggered_by: TriggeredBy) -> Result<Execution> {
        let execution = Execution::running(workflow_id, triggered_by);

        sqlx::query(
            r#"
            INSERT INTO executions (id, workflow_id, status, triggered_by, started_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&execution.id)
        .bind(&execution.workflow_id)
        .bind(execution.status.as_str())
        .bind(execution.triggered_by.as_str())
        .bind(timestamp(execution.started_at))
        .execute(&self.pool)
        .await?;

        Ok(execution)
    }

    async fn append_node_log(&self, execution_id: &str, log: &NodeLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO node_logs
                (execution_id, node_id, node_type, status, started_at, completed_at,
                 input_count, output_count, error)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(execution_id)
        .bind(&log.node_id)
        .bind(&log.node_type)
        .bind(log.status.as_str())
        .bind(timestamp(log.started_at))
        .bind(log.completed_at.map(timestamp))
        .bind(log.input_count as i64)
        .bind(log.output_count as i64)
        .bind(&log.error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn finalize(&self, execution_id: &str, outcome: &RunOutcome) -> Result<bool> {
        let started: Option<String> =
            sqlx::query_scalar("SELECT started_at FROM executions WHERE id = ? AND status = 'running'")
                .bind(execution_id)
                .fetch_optional(&self.pool)
                .await?;

        let Some(started) = started else {
            return Ok(false);
        };
        let duration_ms = (outcome.completed_at - parse_timestamp(&started)?).num_milliseconds();

        let result = sqlx::query(
            r#"
            UPDATE executions SET
                status = ?, completed_at = ?, duration_ms = ?,
                jobs_scraped = ?, jobs_filtered = ?, error = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(outcome.status.as_str())
        .bind(timestamp(outcome.completed_at))
        .bind(duration_ms)
        .bind(outcome.jobs_scraped as i64)
        .bind(outcome.jobs_filtered as i64)
        .bind(&outcome.error)
        .bind(execution_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_execution(&self, id: &str) -> Result<Option<Execution>> {
        let row = sqlx::query(&format!("SELECT {} FROM executions WHERE id = ?", EXECUTION_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.execution_with_logs(&row).await?)),
            None => Ok(None),
        }
    }

    async fn list_executions(&self, workflow_id: &str, limit: usize) -> Result<Vec<Execution>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM executions WHERE workflow_id = ? ORDER BY started_at DESC LIMIT ?",
            EXECUTION_COLUMNS
        ))
        .bind(workflow_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut executions = Vec::with_capacity(rows.len());
        for row in &rows {
            executions.push(self.execution_with_logs(row).await?);
        }
        Ok(executions)
    }
}
