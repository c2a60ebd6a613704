//! Plain-text error responses for the control surface.
//!
//! Every outcome, including failures, is answered with a human-readable body.
//! Request problems (missing parameter, no destination) are reported in-band
//! with `200 OK`; migration failures carry a non-2xx status.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::coordinator::{MigrationError, MigrationFailure};
use crate::pods::AwaitError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    /// In-band diagnostic for a request that was not acted on.
    pub fn diagnostic(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            message: message.into(),
        }
    }

    pub fn missing_param(name: &str) -> Self {
        Self::diagnostic(format!("Url Param '{name}' is missing"))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: message.into(),
        }
    }

    pub fn gateway_timeout(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::GATEWAY_TIMEOUT,
            message: message.into(),
        }
    }
}

impl From<MigrationFailure> for ApiError {
    fn from(failure: MigrationFailure) -> Self {
        if matches!(failure.error, MigrationError::NotConfigured) {
            return Self::diagnostic(failure.error.to_string());
        }

        let mut message = format!("Migration failed: {failure}");
        if !failure.completed.is_empty() {
            message.push_str(&format!("\nCompleted steps: {}", failure.completed_summary()));
        }

        match &failure.error {
            MigrationError::Checkpoint(_) => Self::internal(message),
            MigrationError::NotReady(AwaitError::Timeout { .. }) => Self::gateway_timeout(message),
            _ => Self::bad_gateway(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, format!("{}\n", self.message)).into_response()
    }
}
