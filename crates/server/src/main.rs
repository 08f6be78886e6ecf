//! EdgeMesh coordinator server binary

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use edgemesh_core::{EventHub, Settings};
use edgemesh_db::{DbPool, RepoConfig, Repository};
use edgemesh_server::{build_router, monitors, shutdown, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env()?;
    info!(
        version = edgemesh_server::VERSION,
        db_path = %settings.db_path,
        secured = settings.shared_secret.is_some(),
        "Starting EdgeMesh coordinator"
    );

    let pool = DbPool::connect(&settings.db_path).await?;
    let events = EventHub::new();
    let repo = Arc::new(Repository::new(
        pool,
        events.clone(),
        RepoConfig {
            task_lease_seconds: settings.task_lease_seconds,
            node_stale_seconds: settings.node_stale_seconds,
        },
    ));

    let shutdown_token = shutdown::install_shutdown_handler();
    let monitors = monitors::start(Arc::clone(&repo), &settings, shutdown_token.clone());

    let state = AppState::new(repo, events, settings.clone());
    let app = build_router(state);

    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr, "Coordinator listening");

    let serve_token = shutdown_token.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { serve_token.cancelled().await })
        .await?;

    monitors.stop().await;
    info!("Coordinator shut down");
    Ok(())
}
