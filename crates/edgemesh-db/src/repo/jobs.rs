//! Job lifecycle and derived progress

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use sqlx::SqliteConnection;
use tracing::info;

use edgemesh_core::models::{format_ts, new_id, utc_now};
use edgemesh_core::{Job, JobStatus, JobUpdate, Task, TaskStatus, TaskType};

use crate::error::{DbError, Result};
use crate::models::{encode_json, JobRow, TaskRow};

use super::Repository;

/// One task to create inside a new job.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    /// Opaque caller-provided payload
    #[serde(default = "NewTask::default_payload")]
    pub payload: Value,
    /// Per-task override of the retry cap
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl NewTask {
    fn default_payload() -> Value {
        Value::Object(serde_json::Map::new())
    }
}

/// Optional filters for job listings.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Only jobs in this state
    pub status: Option<JobStatus>,
    /// Only jobs of this task class
    pub task_type: Option<TaskType>,
    /// Only jobs with a task ever assigned to this node
    pub node_id: Option<String>,
}

/// Default retry cap when neither the job nor the task specifies one.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

pub(super) async fn fetch_job_row(
    conn: &mut SqliteConnection,
    job_id: &str,
) -> Result<Option<JobRow>> {
    let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
        .bind(job_id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

/// Aggregate child-task counters for one job.
#[derive(Debug, Clone, Copy, sqlx::FromRow)]
struct TaskCounts {
    total: i64,
    succeeded: i64,
    failed: i64,
    retries: i64,
    started: i64,
    open: i64,
}

async fn fetch_task_counts(conn: &mut SqliteConnection, job_id: &str) -> Result<TaskCounts> {
    let counts = sqlx::query_as::<_, TaskCounts>(
        "SELECT COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN status = 'SUCCEEDED' THEN 1 ELSE 0 END), 0) AS succeeded,
                COALESCE(SUM(CASE WHEN status = 'FAILED' THEN 1 ELSE 0 END), 0) AS failed,
                COALESCE(SUM(retries), 0) AS retries,
                COALESCE(SUM(CASE WHEN started_at IS NOT NULL THEN 1 ELSE 0 END), 0) AS started,
                COALESCE(SUM(CASE WHEN status IN ('QUEUED', 'RUNNING') THEN 1 ELSE 0 END), 0) AS open
         FROM tasks WHERE job_id = ?",
    )
    .bind(job_id)
    .fetch_one(conn)
    .await?;
    Ok(counts)
}

async fn fetch_assigned_nodes(conn: &mut SqliteConnection, job_id: &str) -> Result<Vec<String>> {
    let nodes: Vec<String> = sqlx::query_scalar(
        "SELECT DISTINCT node_id FROM (
             SELECT assigned_node_id AS node_id FROM tasks
             WHERE job_id = ? AND assigned_node_id IS NOT NULL
             UNION
             SELECT r.node_id AS node_id FROM results r
             JOIN tasks t ON t.id = r.task_id
             WHERE t.job_id = ?
         ) ORDER BY node_id ASC",
    )
    .bind(job_id)
    .bind(job_id)
    .fetch_all(conn)
    .await?;
    Ok(nodes)
}

/// Decode a job row and fill in the derived progress fields.
pub(super) async fn load_job_view(conn: &mut SqliteConnection, row: JobRow) -> Result<Job> {
    let mut job = row.into_job()?;
    let counts = fetch_task_counts(conn, &job.id).await?;
    job.total_tasks = counts.total as u32;
    job.completed_tasks = counts.succeeded as u32;
    job.failed_tasks = counts.failed as u32;
    job.total_retries = counts.retries as u32;
    job.assigned_nodes = fetch_assigned_nodes(conn, &job.id).await?;
    Ok(job)
}

/// Re-derive a job's status from its child tasks, inside the caller's
/// transaction. `CANCELLED` is operator-owned and never overwritten.
pub(super) async fn recompute_job_status(
    conn: &mut SqliteConnection,
    job_id: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let Some(row) = fetch_job_row(conn, job_id).await? else {
        return Err(DbError::not_found(format!("job '{job_id}'")));
    };
    let current = row.status.parse::<JobStatus>().map_err(DbError::generic)?;
    if current == JobStatus::Cancelled {
        return Ok(());
    }

    let counts = fetch_task_counts(conn, job_id).await?;
    let all_terminal = counts.total > 0 && counts.open == 0;

    let next = if all_terminal {
        if counts.failed > 0 {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        }
    } else if counts.started > 0 {
        JobStatus::Running
    } else {
        JobStatus::Queued
    };

    if next == current {
        return Ok(());
    }

    let error: Option<String> = if next == JobStatus::Failed {
        sqlx::query_scalar(
            "SELECT error FROM tasks
             WHERE job_id = ? AND status = 'FAILED' AND error IS NOT NULL
             ORDER BY updated_at DESC LIMIT 1",
        )
        .bind(job_id)
        .fetch_optional(&mut *conn)
        .await?
    } else {
        None
    };

    let now_str = format_ts(now);
    let completed_at = if next.is_terminal() {
        Some(now_str.clone())
    } else {
        None
    };

    sqlx::query(
        "UPDATE jobs
         SET status = ?, error = COALESCE(?, error), updated_at = ?,
             completed_at = COALESCE(completed_at, ?)
         WHERE id = ?",
    )
    .bind(next.as_str())
    .bind(&error)
    .bind(&now_str)
    .bind(&completed_at)
    .bind(job_id)
    .execute(conn)
    .await?;

    Ok(())
}

impl Repository {
    /// Insert a job and all of its tasks atomically.
    pub async fn create_job(&self, task_type: TaskType, tasks: Vec<NewTask>) -> Result<Job> {
        if tasks.is_empty() {
            return Err(DbError::validation("a job needs at least one task"));
        }

        let now_str = format_ts(utc_now());
        let job_id = new_id("job");

        let mut tx = self.pool().inner().begin().await?;
        sqlx::query(
            "INSERT INTO jobs (id, type, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&job_id)
        .bind(task_type.as_str())
        .bind(JobStatus::Queued.as_str())
        .bind(&now_str)
        .bind(&now_str)
        .execute(&mut *tx)
        .await?;

        for task in &tasks {
            sqlx::query(
                "INSERT INTO tasks (id, job_id, type, payload_json, status,
                                    retries, max_retries, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?)",
            )
            .bind(new_id("task"))
            .bind(&job_id)
            .bind(task_type.as_str())
            .bind(encode_json(&task.payload)?)
            .bind(TaskStatus::Queued.as_str())
            .bind(task.max_retries.unwrap_or(DEFAULT_MAX_RETRIES) as i64)
            .bind(&now_str)
            .bind(&now_str)
            .execute(&mut *tx)
            .await?;
        }

        let row = fetch_job_row(&mut *tx, &job_id)
            .await?
            .ok_or_else(|| DbError::generic("job vanished during create"))?;
        let job = load_job_view(&mut *tx, row).await?;
        tx.commit().await?;

        info!(job_id = %job.id, task_type = %job.task_type, tasks = job.total_tasks, "Job created");
        self.events().jobs.publish(JobUpdate {
            job_id: job.id.clone(),
        });
        Ok(job)
    }

    /// Jobs matching the filter, newest first, with derived progress.
    pub async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        let mut sql = String::from("SELECT * FROM jobs WHERE 1 = 1");
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.task_type.is_some() {
            sql.push_str(" AND type = ?");
        }
        if filter.node_id.is_some() {
            sql.push_str(
                " AND (EXISTS (SELECT 1 FROM tasks t
                               WHERE t.job_id = jobs.id AND t.assigned_node_id = ?)
                       OR EXISTS (SELECT 1 FROM results r
                                  JOIN tasks t ON t.id = r.task_id
                                  WHERE t.job_id = jobs.id AND r.node_id = ?))",
            );
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC");

        let mut query = sqlx::query_as::<_, JobRow>(&sql);
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(task_type) = filter.task_type {
            query = query.bind(task_type.as_str());
        }
        if let Some(node_id) = &filter.node_id {
            query = query.bind(node_id).bind(node_id);
        }

        let mut conn = self.pool().inner().acquire().await?;
        let rows = query.fetch_all(&mut *conn).await?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            jobs.push(load_job_view(&mut *conn, row).await?);
        }
        Ok(jobs)
    }

    /// One job with derived progress.
    pub async fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        let mut conn = self.pool().inner().acquire().await?;
        match fetch_job_row(&mut *conn, job_id).await? {
            Some(row) => Ok(Some(load_job_view(&mut *conn, row).await?)),
            None => Ok(None),
        }
    }

    /// A job's tasks in insertion order.
    pub async fn get_job_tasks(&self, job_id: &str) -> Result<Vec<Task>> {
        let mut conn = self.pool().inner().acquire().await?;
        if fetch_job_row(&mut *conn, job_id).await?.is_none() {
            return Err(DbError::not_found(format!("job '{job_id}'")));
        }

        let rows =
            sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE job_id = ? ORDER BY rowid ASC")
                .bind(job_id)
                .fetch_all(&mut *conn)
                .await?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    /// Operator-driven cancel. Conflicts when the job is already terminal.
    /// Queued tasks of a cancelled job are no longer scheduled; a task
    /// already running may still terminalize, but the job stays cancelled.
    pub async fn cancel_job(&self, job_id: &str, error: Option<String>) -> Result<Job> {
        let now_str = format_ts(utc_now());

        let mut tx = self.pool().inner().begin().await?;
        let Some(row) = fetch_job_row(&mut *tx, job_id).await? else {
            return Err(DbError::not_found(format!("job '{job_id}'")));
        };
        let current = row.status.parse::<JobStatus>().map_err(DbError::generic)?;
        if current.is_terminal() {
            return Err(DbError::conflict(format!(
                "job '{job_id}' is already {current}"
            )));
        }

        sqlx::query(
            "UPDATE jobs SET status = ?, error = ?, updated_at = ?, completed_at = ?
             WHERE id = ?",
        )
        .bind(JobStatus::Cancelled.as_str())
        .bind(&error)
        .bind(&now_str)
        .bind(&now_str)
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

        let row = fetch_job_row(&mut *tx, job_id)
            .await?
            .ok_or_else(|| DbError::generic("job vanished during cancel"))?;
        let job = load_job_view(&mut *tx, row).await?;
        tx.commit().await?;

        info!(job_id, "Job cancelled");
        self.events().jobs.publish(JobUpdate {
            job_id: job.id.clone(),
        });
        Ok(job)
    }
}
