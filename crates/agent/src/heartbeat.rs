//! Registration and heartbeat client

use serde_json::json;
use tracing::{debug, info};

use crate::config::{detect_ip, AgentConfig};
use crate::system::SystemMonitor;

const SECRET_HEADER: &str = "X-EdgeMesh-Secret";

/// Client for the coordinator's agent endpoints.
pub struct HeartbeatService {
    client: reqwest::Client,
    config: AgentConfig,
}

impl HeartbeatService {
    /// Create a heartbeat client.
    pub fn new(config: AgentConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Coordinator base URL.
    pub fn server_url(&self) -> &str {
        &self.config.server_url
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

    /// Announce this node and its capabilities to the coordinator.
    pub async fn register(&self, monitor: &SystemMonitor) -> anyhow::Result<()> {
        let body = json!({
            "node_id": self.config.node_id,
            "display_name": self.config.display_name,
            "ip": detect_ip(),
            "port": self.config.port,
            "capabilities": {
                "cpu_cores": monitor.cpu_count(),
                "ram_total_gb": monitor.total_memory_gb(),
                "os": monitor.os_name(),
                "arch": monitor.arch(),
            },
        });

        let response = self
            .with_secret(self.client.post(self.endpoint("/v1/agent/register")))
            .json(&body)
            .send()
            .await?;
        response.error_for_status()?;

        info!(node_id = %self.config.node_id, "Registered with coordinator");
        Ok(())
    }

    /// Report a fresh metrics sample, including the live inflight count.
    pub async fn send(&self, monitor: &SystemMonitor, inflight: u32) -> anyhow::Result<()> {
        let body = json!({
            "node_id": self.config.node_id,
            "metrics": {
                "cpu_pct": monitor.cpu_usage().clamp(0.0, 100.0),
                "ram_pct": monitor.ram_usage().clamp(0.0, 100.0),
                "inflight": inflight,
            },
        });

        let response = self
            .with_secret(self.client.post(self.endpoint("/v1/agent/heartbeat")))
            .json(&body)
            .send()
            .await?;
        response.error_for_status()?;

        debug!(inflight, "Heartbeat sent");
        Ok(())
    }
}
