//! Domain models shared by the coordinator and its clients.

mod event;
mod job;
mod node;
mod task;

pub use event::{JobUpdate, NodeUpdate};
pub use job::{Job, JobStatus};
pub use node::{Node, NodeCapabilities, NodeMetrics, NodePolicy, NodeStatus};
pub use task::{Task, TaskResult, TaskStatus, TaskType};

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

/// Current UTC instant.
pub fn utc_now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp as RFC 3339 with fixed microsecond precision.
///
/// The fixed width keeps lexicographic order on stored text equal to
/// chronological order.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 timestamp back into a UTC instant.
pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Generate a prefixed opaque identifier, e.g. `job-1f0c2a9d4b71`.
pub fn new_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &hex[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_round_trip() {
        let now = utc_now();
        let parsed = parse_ts(&format_ts(now)).unwrap();
        assert_eq!(format_ts(now), format_ts(parsed));
    }

    #[test]
    fn formatted_timestamps_sort_chronologically() {
        let early = utc_now();
        let late = early + chrono::Duration::milliseconds(1);
        assert!(format_ts(early) < format_ts(late));
    }

    #[test]
    fn ids_carry_prefix() {
        let id = new_id("task");
        assert!(id.starts_with("task-"));
        assert_eq!(id.len(), "task-".len() + 12);
    }
}
