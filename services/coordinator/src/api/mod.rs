//! HTTP control surface.

mod control;
pub mod error;
mod health;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub use health::HealthResponse;

/// Create the router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(control::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
