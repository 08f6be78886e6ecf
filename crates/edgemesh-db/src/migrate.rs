//! Versioned migration runner
//!
//! Migrations are embedded SQL scripts applied in version order, each
//! inside its own transaction and recorded in `schema_migrations` so a
//! restart only applies what is new.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::Result;

const MIGRATIONS: &[(&str, &str)] = &[("0001_init", include_str!("../migrations/0001_init.sql"))];

/// Apply all pending migrations.
pub async fn run(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
             version    TEXT PRIMARY KEY,
             applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
         )",
    )
    .execute(pool)
    .await?;

    let applied: Vec<String> =
        sqlx::query_scalar("SELECT version FROM schema_migrations ORDER BY version")
            .fetch_all(pool)
            .await?;

    for (version, sql) in MIGRATIONS.iter().copied() {
        if applied.iter().any(|v| v == version) {
            continue;
        }

        let mut tx = pool.begin().await?;
        sqlx::raw_sql(sql).execute(&mut *tx).await?;
        sqlx::query("INSERT INTO schema_migrations(version) VALUES (?)")
            .bind(version)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(version, "Applied migration");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

    async fn bare_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::new().in_memory(true))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn migrations_are_recorded_once() {
        let pool = bare_pool().await;
        run(&pool).await.unwrap();
        run(&pool).await.unwrap();

        let versions: Vec<String> =
            sqlx::query_scalar("SELECT version FROM schema_migrations ORDER BY version")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(versions, vec!["0001_init".to_string()]);
    }

    #[tokio::test]
    async fn schema_tables_exist_after_run() {
        let pool = bare_pool().await;
        run(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        for expected in ["jobs", "nodes", "results", "tasks"] {
            assert!(tables.iter().any(|t| t == expected), "missing {expected}");
        }
    }
}
