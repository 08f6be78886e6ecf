//! Liveness probe

use axum::Json;
use serde::Serialize;

/// Health probe response body
#[derive(Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the process serves requests
    pub status: String,
}

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}
