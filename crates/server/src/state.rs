//! Shared application state

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::RwLock;

use edgemesh_core::{EventHub, NodeMetrics, Settings};
use edgemesh_db::Repository;

/// Heartbeat samples kept per node for the history endpoint.
const METRICS_HISTORY_CAPACITY: usize = 60;

/// State handed to every handler. Constructed once at startup and torn
/// down at shutdown; nothing here is resolved from ambient globals.
#[derive(Clone)]
pub struct AppState {
    /// Typed store operations
    pub repo: Arc<Repository>,
    /// Change-notification topics feeding the stream endpoints
    pub events: EventHub,
    /// Environment configuration
    pub settings: Arc<Settings>,
    /// Recent heartbeat samples per node; observability only, not
    /// authoritative state, lost on restart by design of the schema
    metrics_history: Arc<RwLock<HashMap<String, VecDeque<NodeMetrics>>>>,
}

impl AppState {
    /// Build the state shared across handlers and monitors.
    pub fn new(repo: Arc<Repository>, events: EventHub, settings: Settings) -> Self {
        Self {
            repo,
            events,
            settings: Arc::new(settings),
            metrics_history: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Record a heartbeat sample in the bounded per-node ring.
    pub async fn push_metrics_history(&self, node_id: &str, metrics: NodeMetrics) {
        let mut history = self.metrics_history.write().await;
        let ring = history.entry(node_id.to_string()).or_default();
        if ring.len() >= METRICS_HISTORY_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(metrics);
    }

    /// The most recent samples for a node, oldest first.
    pub async fn metrics_history(&self, node_id: &str, limit: usize) -> Vec<NodeMetrics> {
        let history = self.metrics_history.read().await;
        match history.get(node_id) {
            Some(ring) => {
                let skip = ring.len().saturating_sub(limit);
                ring.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }
}
