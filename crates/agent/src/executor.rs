//! Task pull/execute/report loop
//!
//! Execution is simulated per task type: this agent exists to exercise the
//! coordination protocol, and swapping in a real inference or embedding
//! backend only changes `execute`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use edgemesh_core::{Task, TaskType};

use crate::config::AgentConfig;

const SECRET_HEADER: &str = "X-EdgeMesh-Secret";

/// Task executor
pub struct TaskExecutor {
    client: reqwest::Client,
    config: AgentConfig,
    inflight: Arc<AtomicU32>,
}

impl TaskExecutor {
    /// Create a task executor sharing the agent's inflight counter.
    pub fn new(config: AgentConfig, inflight: Arc<AtomicU32>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            inflight,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.config.server_url.trim_end_matches('/'))
    }

    fn with_secret(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.shared_secret {
            Some(secret) => request.header(SECRET_HEADER, secret),
            None => request,
        }
    }

    /// Ask the coordinator for work and run it. An empty answer is the
    /// normal idle case, not an error.
    pub async fn poll_once(&self) -> anyhow::Result<()> {
        let response = self
            .with_secret(self.client.post(self.endpoint("/v1/tasks/pull")))
            .json(&json!({"node_id": self.config.node_id}))
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response.json().await?;
        let Some(task_value) = body.get("task").filter(|value| !value.is_null()) else {
            return Ok(());
        };
        let task: Task = serde_json::from_value(task_value.clone())?;

        self.inflight.fetch_add(1, Ordering::SeqCst);
        let outcome = self.execute(&task).await;
        self.inflight.fetch_sub(1, Ordering::SeqCst);

        self.report(&task, outcome).await
    }

    /// Simulate executing one task.
    async fn execute(&self, task: &Task) -> (bool, Value, u64) {
        info!(task_id = %task.id, task_type = %task.task_type, "Executing task");
        let started = Instant::now();

        let base_ms = match task.task_type {
            TaskType::Inference => 400,
            TaskType::Embeddings => 150,
            TaskType::Index => 250,
            TaskType::Tokenize => 80,
            TaskType::Preprocess => 200,
        };
        let text_len = task
            .payload
            .get("text")
            .and_then(Value::as_str)
            .map(str::len)
            .unwrap_or(0);
        sleep(Duration::from_millis(base_ms + (text_len as u64).min(200))).await;

        let output = json!({
            "task_type": task.task_type.as_str(),
            "items_processed": 1 + text_len,
        });
        let duration_ms = started.elapsed().as_millis() as u64;
        (true, output, duration_ms)
    }

    /// Report an execution outcome back to the coordinator.
    async fn report(&self, task: &Task, outcome: (bool, Value, u64)) -> anyhow::Result<()> {
        let (success, output, duration_ms) = outcome;
        let body = json!({
            "node_id": self.config.node_id,
            "success": success,
            "duration_ms": duration_ms,
            "output": output,
        });

        let url = self.endpoint(&format!("/v1/tasks/{}/result", task.id));
        let response = self
            .with_secret(self.client.post(url))
            .json(&body)
            .send()
            .await;

        match response {
            Ok(response) => {
                if let Err(err) = response.error_for_status() {
                    warn!(task_id = %task.id, error = %err, "Result rejected");
                } else {
                    debug!(task_id = %task.id, duration_ms, "Result reported");
                }
            }
            Err(err) => warn!(task_id = %task.id, error = %err, "Failed to report result"),
        }

        // Back off slightly to avoid hammering the coordinator.
        sleep(Duration::from_millis(25)).await;
        Ok(())
    }

    /// Tasks currently executing.
    pub fn inflight(&self) -> u32 {
        self.inflight.load(Ordering::SeqCst)
    }
}
