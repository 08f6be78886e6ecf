//! Scheduler policy
//!
//! Pure eligibility evaluation over a node snapshot. The dispatcher and the
//! simulator both call [`rank_candidates`], which is what keeps their
//! answers identical for the same snapshot.

use chrono::{DateTime, Duration, Utc};

use crate::models::{Node, NodeStatus, TaskType};

/// One node's standing for a given task class.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Evaluated node
    pub node_id: String,
    /// Whether every eligibility rule passed
    pub eligible: bool,
    /// Machine-readable rejection reasons; empty when eligible
    pub reasons: Vec<&'static str>,
    /// Reported running-task count, used for ordering
    pub inflight: u32,
    /// Reported CPU percent, used for ordering
    pub cpu_pct: f64,
    /// Reported RAM percent, used for ordering
    pub ram_pct: f64,
}

/// Evaluate a single node against the eligibility rules. Returns the
/// rejection reasons; an empty list means the node is eligible.
pub fn evaluate_node(
    node: &Node,
    task_type: TaskType,
    requires_gpu: bool,
    now: DateTime<Utc>,
    stale_after: Duration,
) -> Vec<&'static str> {
    let mut reasons = Vec::new();

    let fresh = now.signed_duration_since(node.last_seen) < stale_after;
    if node.status != NodeStatus::Online || !fresh {
        reasons.push("node_not_online");
    }
    if !node.policy.accepted_task_types.contains(&task_type) {
        reasons.push("task_not_allowed");
    }
    if node.metrics.inflight >= node.policy.max_concurrent {
        reasons.push("at_capacity");
    }
    if node.metrics.cpu_pct > node.policy.cpu_ceiling {
        reasons.push("cpu_over_ceiling");
    }
    if node.metrics.ram_pct > node.policy.ram_ceiling {
        reasons.push("ram_over_ceiling");
    }
    if requires_gpu && !node.capabilities.has_gpu {
        reasons.push("gpu_required");
    }

    reasons
}

/// Rank every node in the snapshot for the given task class.
///
/// Eligible nodes come first, ordered least-loaded-first by the
/// lexicographic key `(inflight, cpu_pct, ram_pct, node_id)`; the trailing
/// id makes ties deterministic. Ineligible nodes follow, ordered by id,
/// carrying their rejection reasons.
pub fn rank_candidates(
    nodes: &[Node],
    task_type: TaskType,
    requires_gpu: bool,
    now: DateTime<Utc>,
    stale_after: Duration,
) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = nodes
        .iter()
        .map(|node| {
            let reasons = evaluate_node(node, task_type, requires_gpu, now, stale_after);
            Candidate {
                node_id: node.node_id.clone(),
                eligible: reasons.is_empty(),
                reasons,
                inflight: node.metrics.inflight,
                cpu_pct: node.metrics.cpu_pct,
                ram_pct: node.metrics.ram_pct,
            }
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.eligible
            .cmp(&a.eligible)
            .then(a.inflight.cmp(&b.inflight))
            .then(a.cpu_pct.total_cmp(&b.cpu_pct))
            .then(a.ram_pct.total_cmp(&b.ram_pct))
            .then(a.node_id.cmp(&b.node_id))
    });

    candidates
}

/// The eligible subset of [`rank_candidates`], in dispatch order.
pub fn eligible_nodes(
    nodes: &[Node],
    task_type: TaskType,
    requires_gpu: bool,
    now: DateTime<Utc>,
    stale_after: Duration,
) -> Vec<Candidate> {
    rank_candidates(nodes, task_type, requires_gpu, now, stale_after)
        .into_iter()
        .filter(|candidate| candidate.eligible)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{utc_now, NodeCapabilities, NodeMetrics, NodePolicy};

    fn online_node(node_id: &str, now: DateTime<Utc>) -> Node {
        let mut capabilities = NodeCapabilities::default();
        capabilities.normalize();
        Node {
            node_id: node_id.to_string(),
            display_name: node_id.to_string(),
            ip: "10.0.0.1".to_string(),
            port: 9000,
            status: NodeStatus::Online,
            capabilities,
            metrics: NodeMetrics {
                heartbeat_ts: now,
                ..Default::default()
            },
            policy: NodePolicy::default(),
            last_seen: now,
            created_at: now,
            updated_at: now,
        }
    }

    fn stale_after() -> Duration {
        Duration::seconds(15)
    }

    #[test]
    fn fresh_online_node_is_eligible() {
        let now = utc_now();
        let node = online_node("n1", now);
        let reasons = evaluate_node(&node, TaskType::Embeddings, false, now, stale_after());
        assert!(reasons.is_empty());
    }

    #[test]
    fn stale_heartbeat_disqualifies_even_when_status_online() {
        let now = utc_now();
        let mut node = online_node("n1", now);
        node.last_seen = now - Duration::seconds(20);
        let reasons = evaluate_node(&node, TaskType::Embeddings, false, now, stale_after());
        assert!(reasons.contains(&"node_not_online"));
    }

    #[test]
    fn capacity_and_ceilings_disqualify() {
        let now = utc_now();
        let mut node = online_node("n1", now);
        node.metrics.inflight = 1;
        node.metrics.cpu_pct = 95.0;
        node.policy.cpu_ceiling = 80.0;
        let reasons = evaluate_node(&node, TaskType::Embeddings, false, now, stale_after());
        assert!(reasons.contains(&"at_capacity"));
        assert!(reasons.contains(&"cpu_over_ceiling"));
    }

    #[test]
    fn task_allowlist_is_enforced() {
        let now = utc_now();
        let mut node = online_node("n1", now);
        node.policy.accepted_task_types = vec![TaskType::Tokenize];
        let reasons = evaluate_node(&node, TaskType::Inference, false, now, stale_after());
        assert_eq!(reasons, vec!["task_not_allowed"]);
    }

    #[test]
    fn gpu_requirement_checks_capabilities() {
        let now = utc_now();
        let node = online_node("n1", now);
        let reasons = evaluate_node(&node, TaskType::Inference, true, now, stale_after());
        assert_eq!(reasons, vec!["gpu_required"]);

        let mut gpu_node = online_node("n2", now);
        gpu_node.capabilities.has_gpu = true;
        let reasons = evaluate_node(&gpu_node, TaskType::Inference, true, now, stale_after());
        assert!(reasons.is_empty());
    }

    #[test]
    fn ordering_is_least_loaded_first_with_id_tiebreak() {
        let now = utc_now();
        let mut busy = online_node("a-busy", now);
        busy.metrics.inflight = 2;
        busy.policy.max_concurrent = 4;
        let mut warm = online_node("c-warm", now);
        warm.metrics.cpu_pct = 30.0;
        let idle_b = online_node("b-idle", now);
        let idle_a = online_node("a-idle", now);

        let ranked = eligible_nodes(
            &[busy, warm, idle_b, idle_a],
            TaskType::Embeddings,
            false,
            now,
            stale_after(),
        );
        let ids: Vec<&str> = ranked.iter().map(|c| c.node_id.as_str()).collect();
        assert_eq!(ids, vec!["a-idle", "b-idle", "c-warm", "a-busy"]);
    }

    #[test]
    fn ranking_is_deterministic_across_calls() {
        let now = utc_now();
        let nodes = vec![online_node("n2", now), online_node("n1", now)];
        let first = rank_candidates(&nodes, TaskType::Index, false, now, stale_after());
        let second = rank_candidates(&nodes, TaskType::Index, false, now, stale_after());
        let first_ids: Vec<_> = first.iter().map(|c| &c.node_id).collect();
        let second_ids: Vec<_> = second.iter().map(|c| &c.node_id).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn ineligible_nodes_rank_after_eligible_ones() {
        let now = utc_now();
        let mut offline = online_node("a-offline", now);
        offline.status = NodeStatus::Stale;
        let healthy = online_node("z-healthy", now);

        let ranked = rank_candidates(
            &[offline, healthy],
            TaskType::Embeddings,
            false,
            now,
            stale_after(),
        );
        assert_eq!(ranked[0].node_id, "z-healthy");
        assert!(ranked[0].eligible);
        assert!(!ranked[1].eligible);
    }
}
