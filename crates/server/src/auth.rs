//! Shared-secret gate for agent-facing endpoints

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the shared secret.
pub const SECRET_HEADER: &str = "X-EdgeMesh-Secret";

/// Reject requests whose secret header is missing or wrong. A coordinator
/// configured without a secret leaves the gate open.
pub async fn require_shared_secret(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(expected) = &state.settings.shared_secret {
        let provided = request
            .headers()
            .get(SECRET_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .trim();

        if provided != expected {
            return ApiError::Unauthorized("invalid or missing shared secret".to_string())
                .into_response();
        }
    }

    next.run(request).await
}
