//! Liveness endpoints.

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    /// Service status: always "ok" while the server answers.
    pub status: String,

    /// Service name.
    pub service: String,

    /// Service version.
    pub version: String,

    /// Current timestamp (ISO 8601).
    pub timestamp: String,

    /// Whether a migration destination is set.
    pub destination_configured: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/hello", get(hello))
        .route("/healthz", get(healthz))
}

/// Plain-text liveness probe.
async fn hello() -> &'static str {
    "Hello!\n"
}

async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "wormhole".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        destination_configured: state.registry().is_configured(),
    })
}
