//! Cluster and execution aggregates

use std::collections::BTreeMap;

use serde::Serialize;

use edgemesh_core::models::utc_now;
use edgemesh_core::scheduler;
use edgemesh_core::{NodeStatus, TaskType};

use crate::error::Result;

use super::Repository;

/// Aggregated cluster state for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterSummary {
    /// Registered nodes
    pub total_nodes: usize,
    /// Nodes currently `ONLINE`
    pub online_nodes: usize,
    /// Nodes currently `STALE`
    pub stale_nodes: usize,
    /// Nodes currently `OFFLINE`
    pub offline_nodes: usize,
    /// Nodes that never heartbeated
    pub unknown_nodes: usize,
    /// Sum of reported running-task counts
    pub inflight_total: u64,
    /// Eligible-node count per task type, using the live scheduler policy
    pub eligible_by_type: BTreeMap<String, usize>,
}

/// Duration aggregate over a set of results.
#[derive(Debug, Clone, Serialize)]
pub struct DurationStats {
    /// Number of results aggregated
    pub count: usize,
    /// Arithmetic mean in milliseconds
    pub mean_ms: f64,
    /// Median in milliseconds
    pub median_ms: f64,
    /// 95th percentile in milliseconds
    pub p95_ms: f64,
}

impl DurationStats {
    fn from_durations(mut durations: Vec<u64>) -> Option<Self> {
        if durations.is_empty() {
            return None;
        }
        durations.sort_unstable();

        let count = durations.len();
        let sum: u64 = durations.iter().sum();
        let mean_ms = sum as f64 / count as f64;
        let median_ms = if count % 2 == 0 {
            (durations[count / 2 - 1] + durations[count / 2]) as f64 / 2.0
        } else {
            durations[count / 2] as f64
        };
        let p95_index = ((count as f64 * 0.95).ceil() as usize).clamp(1, count) - 1;
        let p95_ms = durations[p95_index] as f64;

        Some(Self {
            count,
            mean_ms,
            median_ms,
            p95_ms,
        })
    }
}

/// Aggregates over the append-only results log.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionMetrics {
    /// All recorded results
    pub total_results: usize,
    /// Successful results
    pub success_results: usize,
    /// Failed results
    pub failed_results: usize,
    /// Duration aggregate over every result
    pub overall: Option<DurationStats>,
    /// Duration aggregate per task type
    pub per_type: BTreeMap<String, DurationStats>,
    /// Per-node success ratio in `[0, 1]`
    pub node_reliability: BTreeMap<String, f64>,
}

#[derive(sqlx::FromRow)]
struct ResultSample {
    success: i64,
    duration_ms: i64,
    node_id: String,
    task_type: String,
}

impl Repository {
    /// Counts by node status, total inflight, and per-type eligibility.
    pub async fn cluster_summary(&self) -> Result<ClusterSummary> {
        let nodes = self.list_nodes().await?;
        let now = utc_now();

        let count_status = |status: NodeStatus| nodes.iter().filter(|n| n.status == status).count();
        let inflight_total = nodes.iter().map(|n| n.metrics.inflight as u64).sum();

        let mut eligible_by_type = BTreeMap::new();
        for task_type in TaskType::ALL {
            let eligible = scheduler::eligible_nodes(
                &nodes,
                task_type,
                false,
                now,
                self.config().stale_threshold(),
            );
            eligible_by_type.insert(task_type.as_str().to_string(), eligible.len());
        }

        Ok(ClusterSummary {
            total_nodes: nodes.len(),
            online_nodes: count_status(NodeStatus::Online),
            stale_nodes: count_status(NodeStatus::Stale),
            offline_nodes: count_status(NodeStatus::Offline),
            unknown_nodes: count_status(NodeStatus::Unknown),
            inflight_total,
            eligible_by_type,
        })
    }

    /// Success counts and duration aggregates over the results log,
    /// overall and per task type, plus per-node reliability.
    pub async fn execution_metrics(&self) -> Result<ExecutionMetrics> {
        let samples = sqlx::query_as::<_, ResultSample>(
            "SELECT r.success, r.duration_ms, r.node_id, t.type AS task_type
             FROM results r
             JOIN tasks t ON t.id = r.task_id",
        )
        .fetch_all(self.pool().inner())
        .await?;

        let total_results = samples.len();
        let success_results = samples.iter().filter(|s| s.success != 0).count();

        let mut all_durations = Vec::with_capacity(total_results);
        let mut durations_by_type: BTreeMap<String, Vec<u64>> = BTreeMap::new();
        let mut node_totals: BTreeMap<String, (usize, usize)> = BTreeMap::new();

        for sample in &samples {
            let duration = sample.duration_ms.max(0) as u64;
            all_durations.push(duration);
            durations_by_type
                .entry(sample.task_type.clone())
                .or_default()
                .push(duration);

            let entry = node_totals.entry(sample.node_id.clone()).or_default();
            entry.0 += 1;
            if sample.success != 0 {
                entry.1 += 1;
            }
        }

        let per_type = durations_by_type
            .into_iter()
            .filter_map(|(task_type, durations)| {
                DurationStats::from_durations(durations).map(|stats| (task_type, stats))
            })
            .collect();

        let node_reliability = node_totals
            .into_iter()
            .map(|(node_id, (total, ok))| (node_id, ok as f64 / total as f64))
            .collect();

        Ok(ExecutionMetrics {
            total_results,
            success_results,
            failed_results: total_results - success_results,
            overall: DurationStats::from_durations(all_durations),
            per_type,
            node_reliability,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_stats_over_odd_set() {
        let stats = DurationStats::from_durations(vec![300, 100, 200]).unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.mean_ms, 200.0);
        assert_eq!(stats.median_ms, 200.0);
        assert_eq!(stats.p95_ms, 300.0);
    }

    #[test]
    fn duration_stats_over_even_set() {
        let stats = DurationStats::from_durations(vec![100, 200, 300, 400]).unwrap();
        assert_eq!(stats.median_ms, 250.0);
        assert_eq!(stats.p95_ms, 400.0);
    }

    #[test]
    fn duration_stats_empty_is_none() {
        assert!(DurationStats::from_durations(Vec::new()).is_none());
    }
}
