//! Row models and domain conversions
//!
//! Rows keep timestamps as RFC 3339 text and structured blobs as JSON
//! text; conversions to the domain structs in `edgemesh-core` live here so
//! the repository modules only deal in domain types.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;

use edgemesh_core::models::{format_ts, parse_ts};
use edgemesh_core::{
    Job, JobStatus, Node, NodeCapabilities, NodeMetrics, NodePolicy, NodeStatus, Task, TaskResult,
    TaskStatus, TaskType,
};

use crate::error::{DbError, Result};

fn required_ts(raw: &str, column: &str) -> Result<DateTime<Utc>> {
    parse_ts(raw).ok_or_else(|| DbError::generic(format!("invalid timestamp in {column}: {raw}")))
}

fn optional_ts(raw: &Option<String>, column: &str) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(|r| required_ts(r, column)).transpose()
}

/// Database row for the `nodes` table
#[derive(Debug, Clone, FromRow)]
pub struct NodeRow {
    /// Primary key
    pub node_id: String,
    /// Display name
    pub display_name: String,
    /// Reachable address
    pub ip: String,
    /// Reachable port
    pub port: i64,
    /// Liveness state
    pub status: String,
    /// Capabilities JSON blob
    pub capabilities_json: String,
    /// Metrics JSON blob
    pub metrics_json: String,
    /// Policy JSON blob
    pub policy_json: String,
    /// Last heartbeat instant
    pub last_seen: String,
    /// Creation instant
    pub created_at: String,
    /// Last mutation instant
    pub updated_at: String,
}

impl NodeRow {
    /// Decode into the domain model.
    pub fn into_node(self) -> Result<Node> {
        let status = self
            .status
            .parse::<NodeStatus>()
            .map_err(DbError::generic)?;
        let capabilities: NodeCapabilities = serde_json::from_str(&self.capabilities_json)?;
        let metrics: NodeMetrics = serde_json::from_str(&self.metrics_json)?;
        let policy: NodePolicy = serde_json::from_str(&self.policy_json)?;

        Ok(Node {
            node_id: self.node_id,
            display_name: self.display_name,
            ip: self.ip,
            port: self.port as u16,
            status,
            capabilities,
            metrics,
            policy,
            last_seen: required_ts(&self.last_seen, "nodes.last_seen")?,
            created_at: required_ts(&self.created_at, "nodes.created_at")?,
            updated_at: required_ts(&self.updated_at, "nodes.updated_at")?,
        })
    }
}

/// Database row for the `jobs` table
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    /// Primary key
    pub id: String,
    /// Task class
    #[sqlx(rename = "type")]
    pub task_type: String,
    /// Lifecycle state
    pub status: String,
    /// Last recorded failure
    pub error: Option<String>,
    /// Creation instant
    pub created_at: String,
    /// Last mutation instant
    pub updated_at: String,
    /// First claim instant
    pub started_at: Option<String>,
    /// Terminalization instant
    pub completed_at: Option<String>,
}

impl JobRow {
    /// Decode into the domain model; progress counters start at zero and
    /// are filled in by the repository.
    pub fn into_job(self) -> Result<Job> {
        let task_type = self
            .task_type
            .parse::<TaskType>()
            .map_err(DbError::generic)?;
        let status = self.status.parse::<JobStatus>().map_err(DbError::generic)?;

        Ok(Job {
            id: self.id,
            task_type,
            status,
            error: self.error,
            created_at: required_ts(&self.created_at, "jobs.created_at")?,
            updated_at: required_ts(&self.updated_at, "jobs.updated_at")?,
            started_at: optional_ts(&self.started_at, "jobs.started_at")?,
            completed_at: optional_ts(&self.completed_at, "jobs.completed_at")?,
            total_tasks: 0,
            completed_tasks: 0,
            failed_tasks: 0,
            total_retries: 0,
            assigned_nodes: Vec::new(),
        })
    }
}

/// Database row for the `tasks` table
#[derive(Debug, Clone, FromRow)]
pub struct TaskRow {
    /// Primary key
    pub id: String,
    /// Owning job
    pub job_id: String,
    /// Task class
    #[sqlx(rename = "type")]
    pub task_type: String,
    /// Opaque payload JSON
    pub payload_json: String,
    /// Lifecycle state
    pub status: String,
    /// Current lease holder
    pub assigned_node_id: Option<String>,
    /// Failed attempts so far
    pub retries: i64,
    /// Allowed failed attempts
    pub max_retries: i64,
    /// Lease deadline
    pub lease_expires_at: Option<String>,
    /// Creation instant
    pub created_at: String,
    /// Last mutation instant
    pub updated_at: String,
    /// First claim instant
    pub started_at: Option<String>,
    /// Terminalization instant
    pub completed_at: Option<String>,
    /// Last recorded failure
    pub error: Option<String>,
}

impl TaskRow {
    /// Decode into the domain model.
    pub fn into_task(self) -> Result<Task> {
        let task_type = self
            .task_type
            .parse::<TaskType>()
            .map_err(DbError::generic)?;
        let status = self
            .status
            .parse::<TaskStatus>()
            .map_err(DbError::generic)?;
        let payload: Value = serde_json::from_str(&self.payload_json)?;

        Ok(Task {
            id: self.id,
            job_id: self.job_id,
            task_type,
            payload,
            status,
            assigned_node_id: self.assigned_node_id,
            retries: self.retries as u32,
            max_retries: self.max_retries as u32,
            lease_expires_at: optional_ts(&self.lease_expires_at, "tasks.lease_expires_at")?,
            created_at: required_ts(&self.created_at, "tasks.created_at")?,
            updated_at: required_ts(&self.updated_at, "tasks.updated_at")?,
            started_at: optional_ts(&self.started_at, "tasks.started_at")?,
            completed_at: optional_ts(&self.completed_at, "tasks.completed_at")?,
            error: self.error,
        })
    }
}

/// Database row for the `results` table
#[derive(Debug, Clone, FromRow)]
pub struct ResultRow {
    /// Append-only row id
    pub id: i64,
    /// Task the report is for
    pub task_id: String,
    /// Reporting node
    pub node_id: String,
    /// Whether the attempt succeeded (0/1)
    pub success: i64,
    /// Opaque output JSON
    pub output_json: Option<String>,
    /// Wall-clock execution time
    pub duration_ms: i64,
    /// Report instant
    pub created_at: String,
}

impl ResultRow {
    /// Decode into the domain model.
    pub fn into_result(self) -> Result<TaskResult> {
        let output = self
            .output_json
            .as_deref()
            .map(serde_json::from_str::<Value>)
            .transpose()?;

        Ok(TaskResult {
            task_id: self.task_id,
            node_id: self.node_id,
            success: self.success != 0,
            output,
            duration_ms: self.duration_ms as u64,
            created_at: required_ts(&self.created_at, "results.created_at")?,
        })
    }
}

/// Encode a JSON value as compact text for storage.
pub fn encode_json<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Encode an optional timestamp for storage.
pub fn encode_optional_ts(ts: Option<DateTime<Utc>>) -> Option<String> {
    ts.map(format_ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgemesh_core::models::utc_now;

    #[test]
    fn node_row_round_trips() {
        let now = format_ts(utc_now());
        let row = NodeRow {
            node_id: "node-1".to_string(),
            display_name: "Node One".to_string(),
            ip: "10.0.0.5".to_string(),
            port: 7001,
            status: "ONLINE".to_string(),
            capabilities_json: encode_json(&NodeCapabilities::default()).unwrap(),
            metrics_json: encode_json(&NodeMetrics::default()).unwrap(),
            policy_json: encode_json(&NodePolicy::default()).unwrap(),
            last_seen: now.clone(),
            created_at: now.clone(),
            updated_at: now,
        };

        let node = row.into_node().unwrap();
        assert_eq!(node.node_id, "node-1");
        assert_eq!(node.status, NodeStatus::Online);
        assert_eq!(node.policy.max_concurrent, 1);
    }

    #[test]
    fn task_row_rejects_bad_status() {
        let now = format_ts(utc_now());
        let row = TaskRow {
            id: "task-1".to_string(),
            job_id: "job-1".to_string(),
            task_type: "EMBEDDINGS".to_string(),
            payload_json: "{}".to_string(),
            status: "DANCING".to_string(),
            assigned_node_id: None,
            retries: 0,
            max_retries: 2,
            lease_expires_at: None,
            created_at: now.clone(),
            updated_at: now,
            started_at: None,
            completed_at: None,
            error: None,
        };
        assert!(row.into_task().is_err());
    }
}
