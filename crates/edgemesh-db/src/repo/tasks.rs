//! Task pull, leasing, results, and lease recovery

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{debug, info, warn};

use edgemesh_core::models::{format_ts, utc_now};
use edgemesh_core::scheduler;
use edgemesh_core::{Job, JobStatus, JobUpdate, NodeStatus, Task, TaskStatus};

use crate::error::{DbError, Result};
use crate::models::{encode_json, encode_optional_ts, TaskRow};

use super::jobs::{fetch_job_row, load_job_view, recompute_job_status};
use super::nodes::{fetch_node_row, fetch_node_snapshot};
use super::Repository;

/// How a submitted result was treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultAck {
    /// The result drove the task's state transition
    Applied,
    /// The result was recorded historically; the task was terminal or
    /// owned by another node
    Stale,
}

const LEASE_EXPIRED_ERROR: &str = "lease_expired";

async fn fetch_task_row(conn: &mut SqliteConnection, task_id: &str) -> Result<Option<TaskRow>> {
    let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE id = ?")
        .bind(task_id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

/// Persist every mutable field of a task.
async fn write_task_state(conn: &mut SqliteConnection, task: &Task) -> Result<()> {
    sqlx::query(
        "UPDATE tasks
         SET status = ?, assigned_node_id = ?, retries = ?, lease_expires_at = ?,
             updated_at = ?, started_at = ?, completed_at = ?, error = ?
         WHERE id = ?",
    )
    .bind(task.status.as_str())
    .bind(&task.assigned_node_id)
    .bind(task.retries as i64)
    .bind(encode_optional_ts(task.lease_expires_at))
    .bind(format_ts(task.updated_at))
    .bind(encode_optional_ts(task.started_at))
    .bind(encode_optional_ts(task.completed_at))
    .bind(&task.error)
    .bind(&task.id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Apply one failed attempt: back to the queue while retries remain,
/// terminal `FAILED` once they are exhausted.
fn apply_failed_attempt(task: &mut Task, error: &str, now: DateTime<Utc>) {
    task.updated_at = now;
    task.error = Some(error.to_string());
    task.lease_expires_at = None;

    if task.retries < task.max_retries {
        task.retries += 1;
        task.status = TaskStatus::Queued;
        task.assigned_node_id = None;
    } else {
        task.status = TaskStatus::Failed;
        task.completed_at = Some(now);
    }
}

impl Repository {
    /// Hand the calling node its next task, if it is the scheduling
    /// winner for one.
    ///
    /// Inside a single transaction: load the caller, snapshot all nodes,
    /// walk `QUEUED` tasks of non-cancelled jobs in `(created_at, id)`
    /// order, and claim the first task whose eligibility ranking puts the
    /// caller in front. Evaluating the policy atomically with the claim
    /// means a cap tightened a moment ago can never be claimed against.
    pub async fn pull_task(&self, node_id: &str) -> Result<Option<Task>> {
        let now = utc_now();

        let mut tx = self.pool().inner().begin().await?;
        let Some(caller_row) = fetch_node_row(&mut *tx, node_id).await? else {
            return Ok(None);
        };
        let caller = caller_row.into_node()?;
        if caller.status != NodeStatus::Online {
            return Ok(None);
        }

        let snapshot = fetch_node_snapshot(&mut *tx).await?;
        let candidates = sqlx::query_as::<_, TaskRow>(
            "SELECT t.* FROM tasks t
             JOIN jobs j ON j.id = t.job_id
             WHERE t.status = 'QUEUED' AND j.status != 'CANCELLED'
             ORDER BY t.created_at ASC, t.id ASC",
        )
        .fetch_all(&mut *tx)
        .await?;

        for row in candidates {
            let mut task = row.into_task()?;
            let ranking = scheduler::eligible_nodes(
                &snapshot,
                task.task_type,
                task.requires_gpu(),
                now,
                self.config().stale_threshold(),
            );
            let winner = ranking.first().map(|candidate| candidate.node_id.as_str());
            if winner != Some(node_id) {
                continue;
            }

            task.status = TaskStatus::Running;
            task.assigned_node_id = Some(node_id.to_string());
            task.lease_expires_at = Some(now + self.config().lease_duration());
            task.started_at = Some(task.started_at.unwrap_or(now));
            task.updated_at = now;
            write_task_state(&mut *tx, &task).await?;

            sqlx::query(
                "UPDATE jobs SET status = ?, started_at = COALESCE(started_at, ?), updated_at = ?
                 WHERE id = ? AND status = ?",
            )
            .bind(JobStatus::Running.as_str())
            .bind(format_ts(now))
            .bind(format_ts(now))
            .bind(&task.job_id)
            .bind(JobStatus::Queued.as_str())
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;

            debug!(task_id = %task.id, node_id, "Task leased");
            self.events().jobs.publish(JobUpdate {
                job_id: task.job_id.clone(),
            });
            return Ok(Some(task));
        }

        Ok(None)
    }

    /// Record an execution report.
    ///
    /// The result row is always appended. Task state only moves when the
    /// reporting node still owns a running lease on the task; anything
    /// else (terminal task, reassigned task) is acknowledged as stale.
    pub async fn submit_result(
        &self,
        task_id: &str,
        node_id: &str,
        success: bool,
        output: Option<serde_json::Value>,
        duration_ms: u64,
        error: Option<String>,
    ) -> Result<(ResultAck, Task, Job)> {
        let now = utc_now();

        let mut tx = self.pool().inner().begin().await?;
        let Some(row) = fetch_task_row(&mut *tx, task_id).await? else {
            return Err(DbError::not_found(format!("task '{task_id}'")));
        };
        let mut task = row.into_task()?;

        sqlx::query(
            "INSERT INTO results (task_id, node_id, success, output_json, duration_ms, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(task_id)
        .bind(node_id)
        .bind(success as i64)
        .bind(output.as_ref().map(encode_json).transpose()?)
        .bind(duration_ms as i64)
        .bind(format_ts(now))
        .execute(&mut *tx)
        .await?;

        let owns_lease = task.status == TaskStatus::Running
            && task.assigned_node_id.as_deref() == Some(node_id);

        let ack = if owns_lease {
            if success {
                task.status = TaskStatus::Succeeded;
                task.completed_at = Some(now);
                task.lease_expires_at = None;
                task.error = None;
                task.updated_at = now;
            } else {
                let reason = error.as_deref().unwrap_or("task_failed");
                apply_failed_attempt(&mut task, reason, now);
            }
            write_task_state(&mut *tx, &task).await?;
            recompute_job_status(&mut *tx, &task.job_id, now).await?;
            ResultAck::Applied
        } else {
            debug!(task_id, node_id, status = %task.status, "Stale result recorded");
            ResultAck::Stale
        };

        let job_row = fetch_job_row(&mut *tx, &task.job_id)
            .await?
            .ok_or_else(|| DbError::generic("job vanished during result submit"))?;
        let job = load_job_view(&mut *tx, job_row).await?;
        tx.commit().await?;

        if ack == ResultAck::Applied {
            self.events().jobs.publish(JobUpdate {
                job_id: task.job_id.clone(),
            });
        }
        Ok((ack, task, job))
    }

    /// Treat every expired lease as a failed attempt, requeueing or
    /// terminalizing each task. Returns the affected job ids; safe to run
    /// concurrently with ingest.
    pub async fn reclaim_expired_leases(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let now_str = format_ts(now);

        let mut tx = self.pool().inner().begin().await?;
        let expired = sqlx::query_as::<_, TaskRow>(
            "SELECT * FROM tasks
             WHERE status = 'RUNNING' AND lease_expires_at IS NOT NULL AND lease_expires_at <= ?
             ORDER BY lease_expires_at ASC",
        )
        .bind(&now_str)
        .fetch_all(&mut *tx)
        .await?;

        let mut job_ids: Vec<String> = Vec::new();
        for row in expired {
            let mut task = row.into_task()?;
            warn!(task_id = %task.id, node_id = ?task.assigned_node_id, "Lease expired");
            apply_failed_attempt(&mut task, LEASE_EXPIRED_ERROR, now);
            write_task_state(&mut *tx, &task).await?;
            if !job_ids.contains(&task.job_id) {
                job_ids.push(task.job_id.clone());
            }
        }

        for job_id in &job_ids {
            recompute_job_status(&mut *tx, job_id, now).await?;
        }
        tx.commit().await?;

        if !job_ids.is_empty() {
            info!(jobs = job_ids.len(), "Reclaimed expired leases");
        }
        for job_id in &job_ids {
            self.events().jobs.publish(JobUpdate {
                job_id: job_id.clone(),
            });
        }
        Ok(job_ids)
    }
}
