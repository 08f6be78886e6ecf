//! # EdgeMesh Core
//!
//! Domain layer for the EdgeMesh coordinator: node/job/task models, the
//! pure scheduler policy, the in-process event bus, and environment
//! configuration.
//!
//! ## Modules
//!
//! - [`models`] - Nodes, jobs, tasks, results, and update events
//! - [`scheduler`] - Eligibility evaluation and candidate ranking
//! - [`bus`] - Bounded publish/subscribe fan-out
//! - [`config`] - Environment-driven settings
//! - [`error`] - Core error types

#![warn(missing_docs)]

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod bus;
pub mod config;
pub mod error;
pub mod models;
pub mod scheduler;

pub use bus::{Delivery, EventBus, EventHub, Subscription};
pub use config::Settings;
pub use error::{Error, Result};
pub use models::{
    Job, JobStatus, JobUpdate, Node, NodeCapabilities, NodeMetrics, NodePolicy, NodeStatus,
    NodeUpdate, Task, TaskResult, TaskStatus, TaskType,
};
pub use scheduler::{rank_candidates, Candidate};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
