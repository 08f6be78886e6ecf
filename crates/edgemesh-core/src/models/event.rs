//! Change-notification events carried by the bus.
//!
//! Events identify what changed, never the new state; subscribers re-read
//! authoritative state from the repository.

use serde::{Deserialize, Serialize};

/// A node row changed (registration, heartbeat, policy, staleness).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeUpdate {
    /// Identifier of the changed node
    pub node_id: String,
}

/// A job or one of its tasks changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobUpdate {
    /// Identifier of the changed job
    pub job_id: String,
}
