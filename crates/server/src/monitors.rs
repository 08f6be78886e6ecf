//! Background monitor loops
//!
//! Two independent periodic sweeps drive the repository: stale-node
//! detection and lease-expiry recovery. Both are set-based and idempotent,
//! so a missed tick never builds a backlog; both log and continue on error
//! and never take the process down.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use edgemesh_core::models::utc_now;
use edgemesh_core::Settings;
use edgemesh_db::Repository;

/// Handles to the running monitor loops.
pub struct Monitors {
    handles: Vec<JoinHandle<()>>,
}

/// Spawn both monitor loops. They run until the token is cancelled.
pub fn start(repo: Arc<Repository>, settings: &Settings, shutdown: CancellationToken) -> Monitors {
    let stale_period = Duration::from_secs(settings.stale_scan_seconds.max(1));
    let lease_period = Duration::from_secs(settings.lease_scan_seconds.max(1));

    let stale_repo = Arc::clone(&repo);
    let stale_token = shutdown.clone();
    let stale_scan = tokio::spawn(async move {
        let mut interval = tokio::time::interval(stale_period);
        loop {
            tokio::select! {
                _ = stale_token.cancelled() => break,
                _ = interval.tick() => {
                    match stale_repo.sweep_stale_nodes(utc_now()).await {
                        Ok(changed) if !changed.is_empty() => {
                            debug!(count = changed.len(), "Stale sweep marked nodes");
                        }
                        Ok(_) => {}
                        Err(err) => error!(error = %err, "Stale sweep failed"),
                    }
                }
            }
        }
        info!("Stale-node monitor stopped");
    });

    let lease_token = shutdown;
    let lease_scan = tokio::spawn(async move {
        let mut interval = tokio::time::interval(lease_period);
        loop {
            tokio::select! {
                _ = lease_token.cancelled() => break,
                _ = interval.tick() => {
                    match repo.reclaim_expired_leases(utc_now()).await {
                        Ok(jobs) if !jobs.is_empty() => {
                            debug!(jobs = jobs.len(), "Lease sweep recovered tasks");
                        }
                        Ok(_) => {}
                        Err(err) => error!(error = %err, "Lease sweep failed"),
                    }
                }
            }
        }
        info!("Lease-expiry monitor stopped");
    });

    Monitors {
        handles: vec![stale_scan, lease_scan],
    }
}

impl Monitors {
    /// Wait for both loops to observe cancellation and exit.
    pub async fn stop(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgemesh_core::EventHub;
    use edgemesh_db::{DbPool, RepoConfig};

    #[tokio::test]
    async fn monitors_stop_on_cancellation() {
        let pool = DbPool::in_memory().await.unwrap();
        let repo = Arc::new(Repository::new(
            pool,
            EventHub::new(),
            RepoConfig::default(),
        ));
        let token = CancellationToken::new();
        let monitors = start(repo, &Settings::default(), token.clone());

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), monitors.stop())
            .await
            .expect("monitors should exit promptly");
    }
}
