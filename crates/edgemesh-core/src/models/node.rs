//! Node models: identity, capabilities, live metrics, operator policy

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::task::TaskType;
use crate::error::{Error, Result};

/// Liveness state of a worker node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeStatus {
    /// Heartbeating within the stale threshold
    Online,
    /// Missed heartbeats past the stale threshold
    Stale,
    /// Explicitly marked gone
    Offline,
    /// Never heartbeated
    Unknown,
}

impl NodeStatus {
    /// Canonical wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Online => "ONLINE",
            NodeStatus::Stale => "STALE",
            NodeStatus::Offline => "OFFLINE",
            NodeStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeStatus {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw {
            "ONLINE" => Ok(NodeStatus::Online),
            "STALE" => Ok(NodeStatus::Stale),
            "OFFLINE" => Ok(NodeStatus::Offline),
            "UNKNOWN" => Ok(NodeStatus::Unknown),
            other => Err(format!("unknown node status '{other}'")),
        }
    }
}

/// Static facts a node declares at registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeCapabilities {
    /// Physical CPU cores
    #[serde(default)]
    pub cpu_cores: Option<u32>,
    /// Total RAM in GiB
    #[serde(default)]
    pub ram_total_gb: Option<f64>,
    /// Whether a GPU is present
    #[serde(default)]
    pub has_gpu: bool,
    /// GPU model name, when present
    #[serde(default)]
    pub gpu_name: Option<String>,
    /// Total GPU memory in GiB, when present
    #[serde(default)]
    pub vram_total_gb: Option<f64>,
    /// Operating system
    #[serde(default)]
    pub os: Option<String>,
    /// CPU architecture
    #[serde(default)]
    pub arch: Option<String>,
    /// Task types the node is able to execute
    #[serde(default)]
    pub task_types: Vec<TaskType>,
    /// Free-form operator labels
    #[serde(default)]
    pub labels: Vec<String>,
}

impl Default for NodeCapabilities {
    fn default() -> Self {
        Self {
            cpu_cores: None,
            ram_total_gb: None,
            has_gpu: false,
            gpu_name: None,
            vram_total_gb: None,
            os: None,
            arch: None,
            task_types: Vec::new(),
            labels: Vec::new(),
        }
    }
}

impl NodeCapabilities {
    /// Normalize declared facts: a named GPU or VRAM total implies
    /// `has_gpu`, and an empty task-type list means "all types".
    pub fn normalize(&mut self) {
        if self.gpu_name.is_some() || self.vram_total_gb.is_some() {
            self.has_gpu = true;
        }
        if self.task_types.is_empty() {
            self.task_types = TaskType::ALL.to_vec();
        }
    }
}

/// Last dynamic sample a node reported via heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMetrics {
    /// CPU utilization percent
    #[serde(default)]
    pub cpu_pct: f64,
    /// RAM utilization percent
    #[serde(default)]
    pub ram_pct: f64,
    /// GPU utilization percent, when a GPU exists
    #[serde(default)]
    pub gpu_pct: Option<f64>,
    /// Tasks the node is currently executing
    #[serde(default)]
    pub inflight: u32,
    /// Instant the sample was taken
    #[serde(default = "super::utc_now")]
    pub heartbeat_ts: DateTime<Utc>,
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self {
            cpu_pct: 0.0,
            ram_pct: 0.0,
            gpu_pct: None,
            inflight: 0,
            heartbeat_ts: super::utc_now(),
        }
    }
}

/// Operator-controlled caps that narrow a node's eligibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodePolicy {
    /// Task types the node will accept
    #[serde(default = "NodePolicy::default_accepted")]
    pub accepted_task_types: Vec<TaskType>,
    /// Maximum concurrently running tasks
    #[serde(default = "NodePolicy::default_max_concurrent")]
    pub max_concurrent: u32,
    /// CPU percent above which the node becomes ineligible
    #[serde(default = "NodePolicy::default_ceiling")]
    pub cpu_ceiling: f64,
    /// RAM percent above which the node becomes ineligible
    #[serde(default = "NodePolicy::default_ceiling")]
    pub ram_ceiling: f64,
}

impl NodePolicy {
    fn default_accepted() -> Vec<TaskType> {
        TaskType::ALL.to_vec()
    }

    fn default_max_concurrent() -> u32 {
        1
    }

    fn default_ceiling() -> f64 {
        100.0
    }

    /// Validate cap ranges before accepting an operator update.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.cpu_ceiling) {
            return Err(Error::validation("cpu_ceiling must be within [0, 100]"));
        }
        if !(0.0..=100.0).contains(&self.ram_ceiling) {
            return Err(Error::validation("ram_ceiling must be within [0, 100]"));
        }
        Ok(())
    }
}

impl Default for NodePolicy {
    fn default() -> Self {
        Self {
            accepted_task_types: Self::default_accepted(),
            max_concurrent: Self::default_max_concurrent(),
            cpu_ceiling: Self::default_ceiling(),
            ram_ceiling: Self::default_ceiling(),
        }
    }
}

/// A worker node as tracked by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Agent-chosen stable identifier
    pub node_id: String,
    /// Human-readable name
    pub display_name: String,
    /// Reachable address
    pub ip: String,
    /// Reachable port
    pub port: u16,
    /// Liveness state
    pub status: NodeStatus,
    /// Declared static facts
    pub capabilities: NodeCapabilities,
    /// Last reported dynamic sample
    pub metrics: NodeMetrics,
    /// Operator caps
    pub policy: NodePolicy,
    /// Last heartbeat or registration instant
    pub last_seen: DateTime<Utc>,
    /// First registration instant
    pub created_at: DateTime<Utc>,
    /// Last mutation instant
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_normalization_implies_gpu() {
        let mut caps = NodeCapabilities {
            gpu_name: Some("RTX 4090".to_string()),
            ..Default::default()
        };
        caps.normalize();
        assert!(caps.has_gpu);
        assert_eq!(caps.task_types.len(), TaskType::ALL.len());
    }

    #[test]
    fn policy_defaults_accept_everything() {
        let policy = NodePolicy::default();
        assert_eq!(policy.max_concurrent, 1);
        assert_eq!(policy.cpu_ceiling, 100.0);
        assert_eq!(policy.accepted_task_types.len(), TaskType::ALL.len());
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn policy_rejects_out_of_range_ceiling() {
        let policy = NodePolicy {
            cpu_ceiling: 120.0,
            ..Default::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn policy_deserializes_with_defaults() {
        let policy: NodePolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy.max_concurrent, 1);
        assert_eq!(policy.ram_ceiling, 100.0);
    }
}
