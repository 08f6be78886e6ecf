//! HTTP surface
//!
//! One module per router, assembled here. The agent and task endpoints sit
//! behind the shared-secret gate; everything else is open.

pub mod agent;
pub mod cluster;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod nodes;
pub mod simulate;
pub mod stream;
pub mod tasks;

use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::auth;
use crate::state::AppState;

/// Build the full application router.
pub fn build_router(state: AppState) -> Router {
    let gated = Router::new()
        .route("/v1/agent/register", post(agent::register))
        .route("/v1/agent/heartbeat", post(agent::heartbeat))
        .route("/v1/tasks/pull", post(tasks::pull))
        .route("/v1/tasks/:id/result", post(tasks::submit_result))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_shared_secret,
        ));

    Router::new()
        .route("/health", get(health::health))
        .route("/v1/nodes", get(nodes::list))
        .route("/v1/nodes/:id", get(nodes::detail))
        .route("/v1/nodes/:id/policy", put(nodes::set_policy))
        .route("/v1/cluster/summary", get(cluster::summary))
        .route("/v1/simulate/schedule", post(simulate::schedule))
        .route("/v1/metrics/execution", get(metrics::execution))
        .route("/v1/jobs", post(jobs::create).get(jobs::list))
        .route("/v1/jobs/:id", get(jobs::detail))
        .route("/v1/jobs/:id/tasks", get(jobs::list_tasks))
        .route("/v1/jobs/:id/status", post(jobs::update_status))
        .route("/v1/demo/jobs/create-embed-burst", post(jobs::demo_burst))
        .route("/v1/stream/nodes", get(stream::nodes))
        .route("/v1/stream/jobs", get(stream::jobs))
        .merge(gated)
        .layer(CorsLayer::permissive())
        .with_state(state)
}
