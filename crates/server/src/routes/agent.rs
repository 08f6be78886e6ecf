//! Agent bring-up and heartbeat ingest

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use edgemesh_core::{Node, NodeMetrics};
use edgemesh_db::NodeRegistration;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// `POST /v1/agent/register`
pub async fn register(
    State(state): State<AppState>,
    Json(registration): Json<NodeRegistration>,
) -> ApiResult<Json<Node>> {
    if registration.node_id.trim().is_empty() {
        return Err(ApiError::bad_request("node_id must not be empty"));
    }
    if registration.display_name.trim().is_empty() {
        return Err(ApiError::bad_request("display_name must not be empty"));
    }
    if registration.ip.trim().is_empty() {
        return Err(ApiError::bad_request("ip must not be empty"));
    }

    Ok(Json(state.repo.upsert_node(registration).await?))
}

/// Heartbeat metrics payload
#[derive(Debug, Deserialize)]
pub struct HeartbeatMetrics {
    /// CPU utilization percent
    pub cpu_pct: f64,
    /// RAM utilization percent
    pub ram_pct: f64,
    /// GPU utilization percent, when a GPU exists
    #[serde(default)]
    pub gpu_pct: Option<f64>,
    /// Tasks the node is currently executing
    #[serde(default)]
    pub inflight: u32,
}

/// Heartbeat request body
#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    /// Reporting node
    pub node_id: String,
    /// Fresh metrics sample
    pub metrics: HeartbeatMetrics,
}

fn pct_in_range(name: &str, value: f64) -> ApiResult<()> {
    if !(0.0..=100.0).contains(&value) {
        return Err(ApiError::bad_request(format!(
            "{name} must be within [0, 100], got {value}"
        )));
    }
    Ok(())
}

/// `POST /v1/agent/heartbeat`
pub async fn heartbeat(
    State(state): State<AppState>,
    Json(request): Json<HeartbeatRequest>,
) -> ApiResult<Json<Node>> {
    if request.node_id.trim().is_empty() {
        return Err(ApiError::bad_request("node_id must not be empty"));
    }
    pct_in_range("cpu_pct", request.metrics.cpu_pct)?;
    pct_in_range("ram_pct", request.metrics.ram_pct)?;
    if let Some(gpu_pct) = request.metrics.gpu_pct {
        pct_in_range("gpu_pct", gpu_pct)?;
    }

    let metrics = NodeMetrics {
        cpu_pct: request.metrics.cpu_pct,
        ram_pct: request.metrics.ram_pct,
        gpu_pct: request.metrics.gpu_pct,
        inflight: request.metrics.inflight,
        ..Default::default()
    };

    let node = state
        .repo
        .record_heartbeat(&request.node_id, metrics)
        .await?;
    state
        .push_metrics_history(&request.node_id, node.metrics.clone())
        .await;

    Ok(Json(node))
}
