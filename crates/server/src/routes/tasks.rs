//! Task pull and result ingest

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use edgemesh_core::{Job, Task};
use edgemesh_db::ResultAck;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Pull request body
#[derive(Debug, Deserialize)]
pub struct PullRequest {
    /// Node asking for work
    pub node_id: String,
}

/// Pull response body; `task` is `null` when no work is available, which
/// is a normal answer and not an error.
#[derive(Serialize)]
pub struct PullResponse {
    /// The leased task, payload included
    pub task: Option<Task>,
}

/// `POST /v1/tasks/pull`
pub async fn pull(
    State(state): State<AppState>,
    Json(request): Json<PullRequest>,
) -> ApiResult<Json<PullResponse>> {
    if request.node_id.trim().is_empty() {
        return Err(ApiError::bad_request("node_id must not be empty"));
    }

    let task = state.repo.pull_task(&request.node_id).await?;
    Ok(Json(PullResponse { task }))
}

/// Result submission body
#[derive(Debug, Deserialize)]
pub struct SubmitResultRequest {
    /// Reporting node
    pub node_id: String,
    /// Whether the attempt succeeded
    pub success: bool,
    /// Wall-clock execution time
    pub duration_ms: u64,
    /// Opaque output produced by the node
    #[serde(default)]
    pub output: Option<Value>,
    /// Failure description, when unsuccessful
    #[serde(default)]
    pub error: Option<String>,
}

/// Result submission response body
#[derive(Serialize)]
pub struct SubmitResultResponse {
    /// `applied` when the report drove the task's transition, `stale`
    /// when it was recorded historically only
    pub accepted: ResultAck,
    /// The task after the report
    pub task: Task,
    /// The owning job with fresh progress
    pub job: Job,
}

/// `POST /v1/tasks/{id}/result`
pub async fn submit_result(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Json(request): Json<SubmitResultRequest>,
) -> ApiResult<Json<SubmitResultResponse>> {
    if request.node_id.trim().is_empty() {
        return Err(ApiError::bad_request("node_id must not be empty"));
    }

    let (accepted, task, job) = state
        .repo
        .submit_result(
            &task_id,
            &request.node_id,
            request.success,
            request.output,
            request.duration_ms,
            request.error,
        )
        .await?;

    Ok(Json(SubmitResultResponse {
        accepted,
        task,
        job,
    }))
}
