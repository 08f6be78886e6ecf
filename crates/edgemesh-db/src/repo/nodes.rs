//! Node registry operations

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::SqliteConnection;
use tracing::info;

use edgemesh_core::models::{format_ts, utc_now};
use edgemesh_core::{Node, NodeCapabilities, NodeMetrics, NodePolicy, NodeStatus, NodeUpdate};

use crate::error::{DbError, Result};
use crate::models::{encode_json, NodeRow};

use super::Repository;

/// Everything an agent sends when announcing itself.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeRegistration {
    /// Agent-chosen stable identifier
    pub node_id: String,
    /// Human-readable name
    pub display_name: String,
    /// Reachable address
    pub ip: String,
    /// Reachable port
    pub port: u16,
    /// Declared static facts
    pub capabilities: NodeCapabilities,
    /// Optional policy; when absent an existing policy is preserved and a
    /// new node gets the defaults
    #[serde(default)]
    pub policy: Option<NodePolicy>,
}

pub(super) async fn fetch_node_row(
    conn: &mut SqliteConnection,
    node_id: &str,
) -> Result<Option<NodeRow>> {
    let row = sqlx::query_as::<_, NodeRow>("SELECT * FROM nodes WHERE node_id = ?")
        .bind(node_id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

pub(super) async fn fetch_node_snapshot(conn: &mut SqliteConnection) -> Result<Vec<Node>> {
    let rows = sqlx::query_as::<_, NodeRow>("SELECT * FROM nodes ORDER BY node_id ASC")
        .fetch_all(conn)
        .await?;
    rows.into_iter().map(NodeRow::into_node).collect()
}

impl Repository {
    /// Create or replace a node from a registration.
    ///
    /// A fresh node starts `ONLINE` with default policy; re-registration
    /// refreshes identity, capabilities, and liveness but preserves the
    /// operator policy unless the registration carries one explicitly.
    pub async fn upsert_node(&self, mut registration: NodeRegistration) -> Result<Node> {
        if registration.node_id.trim().is_empty() {
            return Err(DbError::validation("node_id must not be empty"));
        }
        if let Some(policy) = &registration.policy {
            policy
                .validate()
                .map_err(|e| DbError::validation(e.to_string()))?;
        }
        registration.capabilities.normalize();

        let now = utc_now();
        let now_str = format_ts(now);
        let capabilities_json = encode_json(&registration.capabilities)?;

        let mut tx = self.pool().inner().begin().await?;
        let existing = fetch_node_row(&mut *tx, &registration.node_id).await?;

        match existing {
            Some(row) => {
                let policy_json = match &registration.policy {
                    Some(policy) => encode_json(policy)?,
                    None => row.policy_json.clone(),
                };
                sqlx::query(
                    "UPDATE nodes
                     SET display_name = ?, ip = ?, port = ?, status = ?,
                         capabilities_json = ?, policy_json = ?,
                         last_seen = ?, updated_at = ?
                     WHERE node_id = ?",
                )
                .bind(&registration.display_name)
                .bind(&registration.ip)
                .bind(registration.port as i64)
                .bind(NodeStatus::Online.as_str())
                .bind(&capabilities_json)
                .bind(&policy_json)
                .bind(&now_str)
                .bind(&now_str)
                .bind(&registration.node_id)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                let policy = registration.policy.clone().unwrap_or_default();
                sqlx::query(
                    "INSERT INTO nodes (node_id, display_name, ip, port, status,
                                        capabilities_json, metrics_json, policy_json,
                                        last_seen, created_at, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&registration.node_id)
                .bind(&registration.display_name)
                .bind(&registration.ip)
                .bind(registration.port as i64)
                .bind(NodeStatus::Online.as_str())
                .bind(&capabilities_json)
                .bind(encode_json(&NodeMetrics::default())?)
                .bind(encode_json(&policy)?)
                .bind(&now_str)
                .bind(&now_str)
                .bind(&now_str)
                .execute(&mut *tx)
                .await?;
                info!(node_id = %registration.node_id, "Node registered");
            }
        }

        let node = fetch_node_row(&mut *tx, &registration.node_id)
            .await?
            .ok_or_else(|| DbError::generic("node vanished during upsert"))?
            .into_node()?;
        tx.commit().await?;

        self.events().nodes.publish(NodeUpdate {
            node_id: node.node_id.clone(),
        });
        Ok(node)
    }

    /// Record a heartbeat: refresh metrics and liveness, bringing the node
    /// back `ONLINE` whatever its prior state.
    pub async fn record_heartbeat(&self, node_id: &str, mut metrics: NodeMetrics) -> Result<Node> {
        let now = utc_now();
        metrics.heartbeat_ts = now;
        let now_str = format_ts(now);

        let mut tx = self.pool().inner().begin().await?;
        if fetch_node_row(&mut *tx, node_id).await?.is_none() {
            return Err(DbError::not_found(format!("node '{node_id}'")));
        }

        sqlx::query(
            "UPDATE nodes
             SET metrics_json = ?, status = ?, last_seen = ?, updated_at = ?
             WHERE node_id = ?",
        )
        .bind(encode_json(&metrics)?)
        .bind(NodeStatus::Online.as_str())
        .bind(&now_str)
        .bind(&now_str)
        .bind(node_id)
        .execute(&mut *tx)
        .await?;

        let node = fetch_node_row(&mut *tx, node_id)
            .await?
            .ok_or_else(|| DbError::generic("node vanished during heartbeat"))?
            .into_node()?;
        tx.commit().await?;

        self.events().nodes.publish(NodeUpdate {
            node_id: node.node_id.clone(),
        });
        Ok(node)
    }

    /// Replace a node's operator policy. The new caps take effect on the
    /// very next `pull_task` call.
    pub async fn set_policy(&self, node_id: &str, policy: NodePolicy) -> Result<Node> {
        policy
            .validate()
            .map_err(|e| DbError::validation(e.to_string()))?;
        let now_str = format_ts(utc_now());

        let mut tx = self.pool().inner().begin().await?;
        if fetch_node_row(&mut *tx, node_id).await?.is_none() {
            return Err(DbError::not_found(format!("node '{node_id}'")));
        }

        sqlx::query("UPDATE nodes SET policy_json = ?, updated_at = ? WHERE node_id = ?")
            .bind(encode_json(&policy)?)
            .bind(&now_str)
            .bind(node_id)
            .execute(&mut *tx)
            .await?;

        let node = fetch_node_row(&mut *tx, node_id)
            .await?
            .ok_or_else(|| DbError::generic("node vanished during policy update"))?
            .into_node()?;
        tx.commit().await?;

        self.events().nodes.publish(NodeUpdate {
            node_id: node.node_id.clone(),
        });
        Ok(node)
    }

    /// All nodes, ordered by id.
    pub async fn list_nodes(&self) -> Result<Vec<Node>> {
        let mut conn = self.pool().inner().acquire().await?;
        fetch_node_snapshot(&mut *conn).await
    }

    /// One node by id.
    pub async fn get_node(&self, node_id: &str) -> Result<Option<Node>> {
        let mut conn = self.pool().inner().acquire().await?;
        fetch_node_row(&mut *conn, node_id)
            .await?
            .map(NodeRow::into_node)
            .transpose()
    }

    /// Mark `ONLINE` nodes whose last heartbeat is older than the stale
    /// threshold as `STALE`. Returns the ids that changed; safe to run
    /// repeatedly.
    pub async fn sweep_stale_nodes(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let cutoff = format_ts(now - self.config().stale_threshold());
        let now_str = format_ts(now);

        let mut tx = self.pool().inner().begin().await?;
        let changed: Vec<String> = sqlx::query_scalar(
            "UPDATE nodes SET status = ?, updated_at = ?
             WHERE status = ? AND last_seen <= ?
             RETURNING node_id",
        )
        .bind(NodeStatus::Stale.as_str())
        .bind(&now_str)
        .bind(NodeStatus::Online.as_str())
        .bind(&cutoff)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        for node_id in &changed {
            info!(node_id, "Node went stale");
            self.events().nodes.publish(NodeUpdate {
                node_id: node_id.clone(),
            });
        }
        Ok(changed)
    }
}
