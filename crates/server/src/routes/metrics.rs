//! Execution metrics endpoint

use axum::extract::State;
use axum::Json;

use edgemesh_db::ExecutionMetrics;

use crate::error::ApiResult;
use crate::state::AppState;

/// `GET /v1/metrics/execution`
pub async fn execution(State(state): State<AppState>) -> ApiResult<Json<ExecutionMetrics>> {
    Ok(Json(state.repo.execution_metrics().await?))
}
