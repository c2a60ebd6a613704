//! Migration control endpoints.
//!
//! - `GET /configure?addr=<uri>&host=<node>` sets the destination
//! - `GET /migrate?id=<workload>` runs a migration from this node
//! - `GET /restore?id=<container>` restores a container on this node

use axum::{
    extract::{Query, State},
    routing::get,
    Router,
};
use serde::Deserialize;
use tracing::{debug, error, info};

use super::error::ApiError;
use crate::state::AppState;

/// Query pairs in request order.
///
/// A repeated key resolves to its first value; later values are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    fn first(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// A present, non-empty query parameter.
    fn required(&self, name: &str) -> Result<String, ApiError> {
        self.first(name)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ApiError::missing_param(name))
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/configure", get(configure))
        .route("/migrate", get(migrate))
        .route("/restore", get(restore))
}

async fn configure(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> Result<&'static str, ApiError> {
    let addr = params.required("addr")?;
    let host = params.required("host")?;

    state.registry().configure(addr, host);

    Ok("Destination configured\n")
}

async fn migrate(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> Result<&'static str, ApiError> {
    if !state.registry().is_configured() {
        info!("Migration requested before a destination was configured");
        return Err(ApiError::diagnostic("Destination not configured"));
    }
    let workload_id = params.required("id")?;

    state.coordinator().migrate(&workload_id).await?;

    Ok("Migration complete\n")
}

async fn restore(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> Result<&'static str, ApiError> {
    let container_id = params.required("id")?;
    info!(container_id = %container_id, "Restore requested");

    // Best-effort: the caller is told the restore ran whatever its outcome.
    match state.restorer().restore(&container_id).await {
        Ok(output) => {
            debug!(container_id = %container_id, stdout = %output.stdout.trim_end(), "Restore output");
            info!(container_id = %container_id, "Restore finished");
        }
        Err(e) => {
            error!(container_id = %container_id, error = %e, "Restore failed");
        }
    }

    Ok("Restore complete\n")
}
