//! Error types for the API and the capabilities behind it.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::api::now_iso;

/// Failures of the upstream status check.
#[derive(Error, Debug)]
pub enum UpstreamError {
    /// No response within the configured timeout.
    #[error("timeout of {0}ms exceeded")]
    Timeout(u64),

    /// Connection refused, DNS failure and similar transport errors.
    #[error("{0}")]
    Request(#[source] reqwest::Error),

    /// Upstream answered with a non-success status.
    #[error("Request failed with status code {0}")]
    Status(u16),
}

/// Failures of a developer tool command.
#[derive(Error, Debug)]
pub enum CommandError {
    /// The command could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The command ran and exited unsuccessfully.
    #[error("command exited with code {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    /// Reading command inputs failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Command output could not be understood.
    #[error("failed to parse command output: {0}")]
    Parse(String),

    /// The worker dropped its completion channel without reporting.
    #[error("command was abandoned before completion")]
    Abandoned,
}

/// Errors returned by route handlers.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing or invalid required input.
    #[error("{0}")]
    Validation(String),

    /// Request body could not be parsed.
    #[error("{0}")]
    BadRequest(String),

    /// Status check against the upstream platform failed.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(#[from] UpstreamError),

    /// A developer tool command failed.
    #[error("command failed: {0}")]
    Command(#[from] CommandError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(message) | ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": message })),
            )
                .into_response(),
            ApiError::UpstreamUnavailable(err) => {
                error!(error = %err, "Failed to check Nextcloud status");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({
                        "status": "DOWN",
                        "error": err.to_string(),
                        "timestamp": now_iso(),
                    })),
                )
                    .into_response()
            }
            ApiError::Command(err) => {
                error!(error = %err, "Developer tool command failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({
                        "error": err.to_string(),
                        "timestamp": now_iso(),
                    })),
                )
                    .into_response()
            }
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request() {
        let response = ApiError::Validation("App name is required".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn upstream_failure_maps_to_internal_error() {
        let response = ApiError::from(UpstreamError::Status(503)).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn command_failure_message_includes_exit_code() {
        let err = CommandError::Failed { code: Some(1), stderr: "occ: not installed".into() };
        assert_eq!(err.to_string(), "command exited with code Some(1): occ: not installed");
    }
}
