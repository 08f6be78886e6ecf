//! Task and result models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Class of work a task belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskType {
    /// Model inference
    Inference,
    /// Embedding generation
    Embeddings,
    /// Index building
    Index,
    /// Tokenization
    Tokenize,
    /// Data preprocessing
    Preprocess,
}

impl TaskType {
    /// Every known task type, in a stable order.
    pub const ALL: [TaskType; 5] = [
        TaskType::Inference,
        TaskType::Embeddings,
        TaskType::Index,
        TaskType::Tokenize,
        TaskType::Preprocess,
    ];

    /// Canonical wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Inference => "INFERENCE",
            TaskType::Embeddings => "EMBEDDINGS",
            TaskType::Index => "INDEX",
            TaskType::Tokenize => "TOKENIZE",
            TaskType::Preprocess => "PREPROCESS",
        }
    }

    /// Parse a caller-supplied type, accepting the historical aliases
    /// (`INFER`, `EMBED`, `EMBEDDING`, `PREPROCESSING`).
    pub fn parse_loose(raw: &str) -> Option<TaskType> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "INFER" | "INFERENCE" => Some(TaskType::Inference),
            "EMBED" | "EMBEDDING" | "EMBEDDINGS" => Some(TaskType::Embeddings),
            "INDEX" => Some(TaskType::Index),
            "TOKENIZE" => Some(TaskType::Tokenize),
            "PREPROCESS" | "PREPROCESSING" => Some(TaskType::Preprocess),
            _ => None,
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse_loose(raw).ok_or_else(|| format!("unknown task type '{raw}'"))
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    /// Waiting for a node to claim it
    Queued,
    /// Claimed under an active lease
    Running,
    /// Finished successfully
    Succeeded,
    /// Finished unsuccessfully with retries exhausted
    Failed,
}

impl TaskStatus {
    /// Canonical wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "QUEUED",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Succeeded => "SUCCEEDED",
            TaskStatus::Failed => "FAILED",
        }
    }

    /// Whether the task can never run again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "QUEUED" => Ok(TaskStatus::Queued),
            "RUNNING" => Ok(TaskStatus::Running),
            "SUCCEEDED" => Ok(TaskStatus::Succeeded),
            "FAILED" => Ok(TaskStatus::Failed),
            other => Err(format!("unknown task status '{other}'")),
        }
    }
}

/// The smallest unit the scheduler dispatches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Opaque identifier
    pub id: String,
    /// Owning job
    pub job_id: String,
    /// Task class, copied from the job
    #[serde(rename = "type")]
    pub task_type: TaskType,
    /// Opaque caller-provided payload
    pub payload: Value,
    /// Lifecycle state
    pub status: TaskStatus,
    /// Node currently (or last) holding the lease
    pub assigned_node_id: Option<String>,
    /// Failed attempts so far
    pub retries: u32,
    /// Failed attempts allowed before the task terminalizes
    pub max_retries: u32,
    /// Lease deadline while running
    pub lease_expires_at: Option<DateTime<Utc>>,
    /// Creation instant
    pub created_at: DateTime<Utc>,
    /// Last mutation instant
    pub updated_at: DateTime<Utc>,
    /// First claim instant
    pub started_at: Option<DateTime<Utc>>,
    /// Terminalization instant
    pub completed_at: Option<DateTime<Utc>>,
    /// Last recorded failure
    pub error: Option<String>,
}

impl Task {
    /// Whether the payload asks for a GPU-capable node.
    pub fn requires_gpu(&self) -> bool {
        payload_requires_gpu(&self.payload)
    }
}

/// Read the `requires_gpu` flag out of an otherwise opaque payload.
pub fn payload_requires_gpu(payload: &Value) -> bool {
    payload
        .get("requires_gpu")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// One execution report for a task. Append-only; retries and duplicate
/// reports produce additional rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// Task the report is for
    pub task_id: String,
    /// Reporting node
    pub node_id: String,
    /// Whether the attempt succeeded
    pub success: bool,
    /// Opaque output produced by the node
    pub output: Option<Value>,
    /// Wall-clock execution time
    pub duration_ms: u64,
    /// Report instant
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_type_aliases() {
        assert_eq!(TaskType::parse_loose("embed"), Some(TaskType::Embeddings));
        assert_eq!(TaskType::parse_loose("INFER"), Some(TaskType::Inference));
        assert_eq!(
            TaskType::parse_loose("preprocessing"),
            Some(TaskType::Preprocess)
        );
        assert_eq!(TaskType::parse_loose("bogus"), None);
    }

    #[test]
    fn task_type_serializes_uppercase() {
        let encoded = serde_json::to_string(&TaskType::Embeddings).unwrap();
        assert_eq!(encoded, "\"EMBEDDINGS\"");
    }

    #[test]
    fn terminal_statuses() {
        assert!(TaskStatus::Succeeded.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Queued.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn gpu_flag_defaults_to_false() {
        assert!(!payload_requires_gpu(&json!({"text": "chunk"})));
        assert!(payload_requires_gpu(&json!({"requires_gpu": true})));
        assert!(!payload_requires_gpu(&json!({"requires_gpu": "yes"})));
    }
}
