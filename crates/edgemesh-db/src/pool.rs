//! Database connection pool

use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::error::Result;
use crate::migrate;

/// Database connection pool wrapper.
///
/// The pool is capped at a single connection: SQLite already serializes
/// writers, and one shared connection makes every repository transaction
/// serializable with respect to every other, which the scheduling and
/// lease invariants rely on.
#[derive(Debug, Clone)]
pub struct DbPool(SqlitePool);

impl DbPool {
    /// Open (creating if missing) the store at `path` and run migrations.
    pub async fn connect(path: &str) -> Result<Self> {
        info!(path, "Opening coordinator store");
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        Self::with_options(options).await
    }

    /// Create an in-memory store for testing.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true);
        Self::with_options(options).await
    }

    async fn with_options(options: SqliteConnectOptions) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        migrate::run(&pool).await?;
        Ok(Self(pool))
    }

    /// Get the inner pool
    pub fn inner(&self) -> &SqlitePool {
        &self.0
    }

    /// Close the pool
    pub async fn close(&self) {
        self.0.close().await;
    }
}
