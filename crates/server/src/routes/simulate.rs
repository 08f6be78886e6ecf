//! Scheduling dry-run

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use edgemesh_core::models::utc_now;
use edgemesh_core::scheduler;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Simulation request body
#[derive(Debug, Deserialize)]
pub struct SimulateRequest {
    /// Task class to rank candidates for
    pub task_type: String,
    /// Whether the hypothetical task demands a GPU
    #[serde(default)]
    pub requires_gpu: bool,
}

/// One ranked node in the simulation response
#[derive(Serialize)]
pub struct CandidateView {
    /// Evaluated node
    pub node_id: String,
    /// Whether every eligibility rule passed
    pub eligible: bool,
    /// Machine-readable rejection reasons; empty when eligible
    pub reasons: Vec<String>,
    /// Reported running-task count
    pub inflight: u32,
    /// Reported CPU percent
    pub cpu_pct: f64,
    /// Reported RAM percent
    pub ram_pct: f64,
}

/// Simulation response body
#[derive(Serialize)]
pub struct SimulateResponse {
    /// Canonical task type that was simulated
    pub task_type: String,
    /// GPU requirement that was applied
    pub requires_gpu: bool,
    /// The node a pull would hand the task to right now, if any
    pub chosen_node_id: Option<String>,
    /// Every node, eligible first in dispatch order
    pub candidates: Vec<CandidateView>,
}

/// `POST /v1/simulate/schedule`
///
/// Applies the live scheduler policy to the current node snapshot without
/// mutating anything or publishing events. Because the dispatcher ranks
/// with the same function, the simulation and a concurrent pull agree on
/// the winner for identical snapshots.
pub async fn schedule(
    State(state): State<AppState>,
    Json(request): Json<SimulateRequest>,
) -> ApiResult<Json<SimulateResponse>> {
    let task_type = edgemesh_core::TaskType::parse_loose(&request.task_type)
        .ok_or_else(|| ApiError::bad_request(format!("unsupported task type '{}'", request.task_type)))?;

    let snapshot = state.repo.list_nodes().await?;
    let ranked = scheduler::rank_candidates(
        &snapshot,
        task_type,
        request.requires_gpu,
        utc_now(),
        state.repo.config().stale_threshold(),
    );

    let chosen_node_id = ranked
        .iter()
        .find(|candidate| candidate.eligible)
        .map(|candidate| candidate.node_id.clone());

    let candidates = ranked
        .into_iter()
        .map(|candidate| CandidateView {
            node_id: candidate.node_id,
            eligible: candidate.eligible,
            reasons: candidate.reasons.iter().map(|r| r.to_string()).collect(),
            inflight: candidate.inflight,
            cpu_pct: candidate.cpu_pct,
            ram_pct: candidate.ram_pct,
        })
        .collect();

    Ok(Json(SimulateResponse {
        task_type: task_type.as_str().to_string(),
        requires_gpu: request.requires_gpu,
        chosen_node_id,
        candidates,
    }))
}
