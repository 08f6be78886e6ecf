//! Job submission, listing, and operator transitions

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use edgemesh_core::{Job, JobStatus, Task, TaskType};
use edgemesh_db::{JobFilter, NewTask};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const MAX_TASKS_PER_JOB: usize = 500;

/// Job creation body: either an explicit task list or a bare count.
#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    /// Task class for every child task
    #[serde(rename = "type")]
    pub task_type: String,
    /// Explicit tasks with payloads
    #[serde(default)]
    pub tasks: Option<Vec<NewTask>>,
    /// Number of generated tasks when no explicit list is given
    #[serde(default)]
    pub task_count: Option<usize>,
    /// Opaque reference plumbed into generated payloads
    #[serde(default)]
    pub payload_ref: Option<String>,
}

fn parse_task_type(raw: &str) -> ApiResult<TaskType> {
    TaskType::parse_loose(raw)
        .ok_or_else(|| ApiError::bad_request(format!("unsupported task type '{raw}'")))
}

fn build_tasks(request: &CreateJobRequest, task_type: TaskType) -> ApiResult<Vec<NewTask>> {
    if let Some(tasks) = &request.tasks {
        if tasks.is_empty() {
            return Err(ApiError::bad_request("tasks must not be empty"));
        }
        if tasks.len() > MAX_TASKS_PER_JOB {
            return Err(ApiError::bad_request(format!(
                "at most {MAX_TASKS_PER_JOB} tasks per job"
            )));
        }
        return Ok(tasks.clone());
    }

    let count = request.task_count.unwrap_or(1);
    if count == 0 || count > MAX_TASKS_PER_JOB {
        return Err(ApiError::bad_request(format!(
            "task_count must be within [1, {MAX_TASKS_PER_JOB}]"
        )));
    }

    Ok((0..count)
        .map(|index| NewTask {
            payload: json!({
                "task_index": index,
                "task_type": task_type.as_str(),
                "payload_ref": request.payload_ref,
            }),
            max_retries: None,
        })
        .collect())
}

/// `POST /v1/jobs`
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    let task_type = parse_task_type(&request.task_type)?;
    let tasks = build_tasks(&request, task_type)?;

    let job = state.repo.create_job(task_type, tasks).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// Listing filters
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Only jobs in this state
    #[serde(default)]
    pub status: Option<String>,
    /// Only jobs of this task class
    #[serde(default)]
    pub task_type: Option<String>,
    /// Only jobs with a task ever assigned to this node
    #[serde(default)]
    pub node_id: Option<String>,
}

/// `GET /v1/jobs`
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Job>>> {
    let status = query
        .status
        .as_deref()
        .map(|raw| raw.parse::<JobStatus>().map_err(ApiError::BadRequest))
        .transpose()?;
    let task_type = query
        .task_type
        .as_deref()
        .map(parse_task_type)
        .transpose()?;

    let filter = JobFilter {
        status,
        task_type,
        node_id: query.node_id,
    };
    Ok(Json(state.repo.list_jobs(&filter).await?))
}

/// `GET /v1/jobs/{id}`
pub async fn detail(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Job>> {
    state
        .repo
        .get_job(&job_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("job '{job_id}'")))
}

/// `GET /v1/jobs/{id}/tasks`
pub async fn list_tasks(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Vec<Task>>> {
    Ok(Json(state.repo.get_job_tasks(&job_id).await?))
}

/// Operator transition body
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    /// Target state; only `CANCELLED` is operator-reachable
    pub status: String,
    /// Optional reason recorded on the job
    #[serde(default)]
    pub error: Option<String>,
}

/// `POST /v1/jobs/{id}/status`
pub async fn update_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> ApiResult<Json<Job>> {
    let status = request
        .status
        .parse::<JobStatus>()
        .map_err(ApiError::BadRequest)?;
    if status != JobStatus::Cancelled {
        return Err(ApiError::bad_request(
            "job status is derived from tasks; only CANCELLED can be set by an operator",
        ));
    }

    Ok(Json(state.repo.cancel_job(&job_id, request.error).await?))
}

/// Demo burst query options
#[derive(Debug, Deserialize)]
pub struct BurstQuery {
    /// Number of jobs to create
    #[serde(default = "BurstQuery::default_count")]
    pub count: usize,
    /// Tasks per created job
    #[serde(default = "BurstQuery::default_tasks_per_job")]
    pub tasks_per_job: usize,
}

impl BurstQuery {
    fn default_count() -> usize {
        20
    }

    fn default_tasks_per_job() -> usize {
        6
    }
}

/// Demo burst response body
#[derive(Serialize)]
pub struct BurstResponse {
    /// Jobs created
    pub created_count: usize,
    /// The created jobs with initial progress
    pub jobs: Vec<Job>,
}

/// `POST /v1/demo/jobs/create-embed-burst`
///
/// Test fixture: floods the queue with small embedding jobs so stream
/// consumers and agents have something to chew on.
pub async fn demo_burst(
    State(state): State<AppState>,
    Query(query): Query<BurstQuery>,
) -> ApiResult<Json<BurstResponse>> {
    if query.count == 0 || query.count > 200 {
        return Err(ApiError::bad_request("count must be within [1, 200]"));
    }
    if query.tasks_per_job == 0 || query.tasks_per_job > 64 {
        return Err(ApiError::bad_request("tasks_per_job must be within [1, 64]"));
    }

    let mut jobs = Vec::with_capacity(query.count);
    for job_index in 0..query.count {
        let tasks = (0..query.tasks_per_job)
            .map(|task_index| NewTask {
                payload: json!({
                    "task_index": task_index,
                    "task_type": TaskType::Embeddings.as_str(),
                    "text": format!("demo chunk {job_index:04}-{task_index:02}"),
                }),
                max_retries: None,
            })
            .collect();
        jobs.push(state.repo.create_job(TaskType::Embeddings, tasks).await?);
    }

    Ok(Json(BurstResponse {
        created_count: jobs.len(),
        jobs,
    }))
}
