//! Job model and derived progress view

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::task::TaskType;

/// Lifecycle state of a job, derived from its child tasks except for the
/// operator-only `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    /// No child task has started
    Queued,
    /// At least one child started, none failed terminally
    Running,
    /// Every child succeeded
    Completed,
    /// Some child failed with retries exhausted
    Failed,
    /// Stopped by an operator
    Cancelled,
}

impl JobStatus {
    /// Canonical wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }

    /// Whether the job can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "QUEUED" => Ok(JobStatus::Queued),
            "RUNNING" => Ok(JobStatus::Running),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            "CANCELLED" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status '{other}'")),
        }
    }
}

/// A user-submitted unit of work, decomposed into tasks.
///
/// The progress counters (`total_tasks` through `assigned_nodes`) are not
/// stored; the repository derives them from the child tasks on every read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Opaque identifier
    pub id: String,
    /// Class of the child tasks
    #[serde(rename = "type")]
    pub task_type: TaskType,
    /// Lifecycle state
    pub status: JobStatus,
    /// Last recorded failure
    pub error: Option<String>,
    /// Creation instant
    pub created_at: DateTime<Utc>,
    /// Last mutation instant
    pub updated_at: DateTime<Utc>,
    /// Instant the first child task was claimed
    pub started_at: Option<DateTime<Utc>>,
    /// Instant the job reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
    /// Number of child tasks
    #[serde(default)]
    pub total_tasks: u32,
    /// Child tasks that succeeded
    #[serde(default)]
    pub completed_tasks: u32,
    /// Child tasks that failed terminally
    #[serde(default)]
    pub failed_tasks: u32,
    /// Failed attempts across all child tasks
    #[serde(default)]
    pub total_retries: u32,
    /// Distinct nodes that ever ran a child task
    #[serde(default)]
    pub assigned_nodes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("cancelled".parse::<JobStatus>(), Ok(JobStatus::Cancelled));
        assert!("paused".parse::<JobStatus>().is_err());
    }
}
