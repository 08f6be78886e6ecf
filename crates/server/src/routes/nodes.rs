//! Node read paths and policy updates

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use edgemesh_core::{Node, NodeMetrics, NodePolicy};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// `GET /v1/nodes`
pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<Node>>> {
    Ok(Json(state.repo.list_nodes().await?))
}

/// Query options for the node detail endpoint
#[derive(Debug, Deserialize)]
pub struct DetailQuery {
    /// Include the recent heartbeat samples
    #[serde(default)]
    pub include_metrics_history: bool,
    /// How many samples to return, newest-biased
    #[serde(default = "DetailQuery::default_limit")]
    pub history_limit: usize,
}

impl DetailQuery {
    fn default_limit() -> usize {
        20
    }
}

/// Node detail response body
#[derive(Serialize)]
pub struct NodeDetail {
    /// The node as stored
    pub node: Node,
    /// Recent heartbeat samples, oldest first, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_history: Option<Vec<NodeMetrics>>,
}

/// `GET /v1/nodes/{id}`
pub async fn detail(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
    Query(query): Query<DetailQuery>,
) -> ApiResult<Json<NodeDetail>> {
    let node = state
        .repo
        .get_node(&node_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("node '{node_id}'")))?;

    let metrics_history = if query.include_metrics_history {
        Some(state.metrics_history(&node_id, query.history_limit).await)
    } else {
        None
    };

    Ok(Json(NodeDetail {
        node,
        metrics_history,
    }))
}

/// `PUT /v1/nodes/{id}/policy`
///
/// Replaces the operator policy; a tightened cap is honored by the very
/// next pull.
pub async fn set_policy(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
    Json(policy): Json<NodePolicy>,
) -> ApiResult<Json<Node>> {
    policy
        .validate()
        .map_err(|err| ApiError::bad_request(err.to_string()))?;
    Ok(Json(state.repo.set_policy(&node_id, policy).await?))
}
