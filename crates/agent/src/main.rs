//! EdgeMesh agent binary

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tracing::{info, warn, Level};

use edgemesh_agent::{AgentConfig, HeartbeatService, SystemMonitor, TaskExecutor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let config = AgentConfig::from_env()?;
    info!(
        version = edgemesh_agent::VERSION,
        node_id = %config.node_id,
        server = %config.server_url,
        "EdgeMesh agent starting"
    );

    let mut monitor = SystemMonitor::new();
    info!(
        cores = monitor.cpu_count(),
        ram_gb = format!("{:.2}", monitor.total_memory_gb()),
        "System detected"
    );

    let inflight = Arc::new(AtomicU32::new(0));
    let heartbeat = HeartbeatService::new(config.clone());
    let executor = TaskExecutor::new(config.clone(), Arc::clone(&inflight));

    // Keep retrying registration; the coordinator may come up after us.
    loop {
        match heartbeat.register(&monitor).await {
            Ok(()) => break,
            Err(err) => {
                warn!(error = %err, "Registration failed, retrying");
                time::sleep(Duration::from_secs(3)).await;
            }
        }
    }

    let mut heartbeat_interval = time::interval(Duration::from_secs(config.heartbeat_seconds));
    let mut poll_interval = time::interval(Duration::from_secs(config.poll_seconds));

    loop {
        tokio::select! {
            _ = heartbeat_interval.tick() => {
                monitor.update();
                if let Err(err) = heartbeat.send(&monitor, inflight.load(Ordering::SeqCst)).await {
                    warn!(error = %err, "Failed to send heartbeat");
                }
            }
            _ = poll_interval.tick() => {
                if let Err(err) = executor.poll_once().await {
                    warn!(error = %err, "Task poll failed");
                }
            }
        }
    }
}
