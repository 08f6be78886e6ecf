//! Agent configuration

use std::net::UdpSocket;
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Agent settings, read once at startup.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Coordinator base URL
    pub server_url: String,
    /// Stable node identifier, persisted across restarts
    pub node_id: String,
    /// Human-readable name reported at registration
    pub display_name: String,
    /// Port the agent reports as reachable
    pub port: u16,
    /// Seconds between heartbeats
    pub heartbeat_seconds: u64,
    /// Seconds between task polls
    pub poll_seconds: u64,
    /// Shared secret for the coordinator's agent endpoints
    pub shared_secret: Option<String>,
}

impl AgentConfig {
    /// Load configuration from the environment.
    pub fn from_env() -> anyhow::Result<Self> {
        let id_file = std::env::var("EDGEMESH_NODE_ID_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.edgemesh/node_id"));

        let node_id = match std::env::var("EDGEMESH_NODE_ID") {
            Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
            _ => load_or_create_node_id(&id_file)?,
        };

        let display_name = std::env::var("EDGEMESH_DISPLAY_NAME")
            .ok()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| node_id.clone());

        Ok(Self {
            server_url: std::env::var("EDGEMESH_SERVER_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            node_id,
            display_name,
            port: std::env::var("EDGEMESH_AGENT_PORT")
                .ok()
                .and_then(|raw| raw.trim().parse().ok())
                .unwrap_or(9400),
            heartbeat_seconds: env_u64("HEARTBEAT_SECONDS", 5),
            poll_seconds: env_u64("TASK_POLL_SECONDS", 2),
            shared_secret: std::env::var("EDGE_MESH_SHARED_SECRET")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        })
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

/// Read the persisted node id, or mint one and write it down so the id
/// survives agent restarts.
pub fn load_or_create_node_id(path: &Path) -> anyhow::Result<String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if path.exists() {
        let value = std::fs::read_to_string(path)?;
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }

    let hex = Uuid::new_v4().simple().to_string();
    let node_id = format!("node-{}", &hex[..12]);
    std::fs::write(path, format!("{node_id}\n"))?;
    Ok(node_id)
}

/// Best-effort detection of the address other LAN hosts can reach us on.
pub fn detect_ip() -> String {
    // Routing trick: no packet is sent, the kernel just picks the
    // outbound interface.
    if let Ok(socket) = UdpSocket::bind("0.0.0.0:0") {
        if socket.connect("8.8.8.8:80").is_ok() {
            if let Ok(addr) = socket.local_addr() {
                return addr.ip().to_string();
            }
        }
    }
    "127.0.0.1".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_is_created_once_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node_id");

        let first = load_or_create_node_id(&path).unwrap();
        assert!(first.starts_with("node-"));

        let second = load_or_create_node_id(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn detect_ip_returns_something() {
        assert!(!detect_ip().is_empty());
    }
}
