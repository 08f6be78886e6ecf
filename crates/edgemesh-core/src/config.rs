//! Environment-driven coordinator settings

use crate::error::{Error, Result};

/// Coordinator settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Bind host for the HTTP server
    pub host: String,
    /// Bind port for the HTTP server
    pub port: u16,
    /// Path of the SQLite store file
    pub db_path: String,
    /// Shared secret gating agent/task endpoints; `None` disables the gate
    pub shared_secret: Option<String>,
    /// Seconds without a heartbeat before a node is considered stale
    pub node_stale_seconds: u64,
    /// Seconds a task lease is held before it may be reclaimed
    pub task_lease_seconds: u64,
    /// Period of the stale-node sweep
    pub stale_scan_seconds: u64,
    /// Period of the expired-lease sweep
    pub lease_scan_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            db_path: "./edgemesh.db".to_string(),
            shared_secret: None,
            node_stale_seconds: 15,
            task_lease_seconds: 30,
            stale_scan_seconds: 5,
            lease_scan_seconds: 3,
        }
    }
}

fn env_u64(name: &str, default: u64) -> Result<u64> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| Error::config(format!("{name} must be an integer, got '{raw}'"))),
        Err(_) => Ok(default),
    }
}

impl Settings {
    /// Load settings from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let port = match std::env::var("COORDINATOR_PORT") {
            Ok(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| Error::config(format!("COORDINATOR_PORT must be a port, got '{raw}'")))?,
            Err(_) => defaults.port,
        };

        let shared_secret = std::env::var("EDGE_MESH_SHARED_SECRET")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Self {
            host: std::env::var("COORDINATOR_HOST").unwrap_or(defaults.host),
            port,
            db_path: std::env::var("COORDINATOR_DB_PATH").unwrap_or(defaults.db_path),
            shared_secret,
            node_stale_seconds: env_u64("NODE_STALE_SECONDS", defaults.node_stale_seconds)?,
            task_lease_seconds: env_u64("TASK_LEASE_SECONDS", defaults.task_lease_seconds)?,
            stale_scan_seconds: env_u64("STALE_SCAN_SECONDS", defaults.stale_scan_seconds)?,
            lease_scan_seconds: env_u64("LEASE_SCAN_SECONDS", defaults.lease_scan_seconds)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_timeouts() {
        let settings = Settings::default();
        assert_eq!(settings.node_stale_seconds, 15);
        assert_eq!(settings.task_lease_seconds, 30);
        assert_eq!(settings.stale_scan_seconds, 5);
        assert_eq!(settings.lease_scan_seconds, 3);
        assert!(settings.shared_secret.is_none());
    }

    #[test]
    fn missing_env_falls_back_to_default() {
        let result = env_u64("NODE_STALE_SECONDS_TEST_MISSING", 15);
        assert_eq!(result.unwrap(), 15);
    }
}
