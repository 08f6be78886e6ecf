//! Repository operations
//!
//! Sole gatekeeper of the store. Every multi-row mutation runs inside a
//! single transaction on the single-connection pool, so no observer can
//! see a partial claim or a half-applied result. Change events are
//! published only after the owning transaction commits.

mod jobs;
mod metrics;
mod nodes;
mod tasks;

pub use jobs::{JobFilter, NewTask};
pub use metrics::{ClusterSummary, DurationStats, ExecutionMetrics};
pub use nodes::NodeRegistration;
pub use tasks::ResultAck;

use chrono::Duration;

use edgemesh_core::EventHub;

use crate::pool::DbPool;

/// Tunables the repository needs from the environment.
#[derive(Debug, Clone)]
pub struct RepoConfig {
    /// Seconds a task lease is held before it may be reclaimed
    pub task_lease_seconds: u64,
    /// Seconds without a heartbeat before a node is considered stale
    pub node_stale_seconds: u64,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            task_lease_seconds: 30,
            node_stale_seconds: 15,
        }
    }
}

impl RepoConfig {
    /// Lease duration as a chrono interval.
    pub fn lease_duration(&self) -> Duration {
        Duration::seconds(self.task_lease_seconds as i64)
    }

    /// Stale threshold as a chrono interval.
    pub fn stale_threshold(&self) -> Duration {
        Duration::seconds(self.node_stale_seconds as i64)
    }
}

/// Typed operations over the store. Cheap to clone; handlers and monitors
/// share one instance through `Arc`.
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
    events: EventHub,
    config: RepoConfig,
}

impl Repository {
    /// Create a repository over an opened pool.
    pub fn new(pool: DbPool, events: EventHub, config: RepoConfig) -> Self {
        Self {
            pool,
            events,
            config,
        }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// The event hub mutations publish into.
    pub fn events(&self) -> &EventHub {
        &self.events
    }

    /// The tunables this repository was built with.
    pub fn config(&self) -> &RepoConfig {
        &self.config
    }
}
