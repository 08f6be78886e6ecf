//! Aggregated cluster view

use axum::extract::State;
use axum::Json;

use edgemesh_db::ClusterSummary;

use crate::error::ApiResult;
use crate::state::AppState;

/// `GET /v1/cluster/summary`
///
/// Totals are computed server-side so the dashboard never duplicates
/// scheduler math.
pub async fn summary(State(state): State<AppState>) -> ApiResult<Json<ClusterSummary>> {
    Ok(Json(state.repo.cluster_summary().await?))
}
