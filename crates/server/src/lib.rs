//! EdgeMesh coordinator server
//!
//! Ingest handlers, the shared-secret gate, SSE stream adapters, and the
//! background monitors, assembled into one axum application.

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod auth;
pub mod error;
pub mod monitors;
pub mod routes;
pub mod shutdown;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::build_router;
pub use state::AppState;
