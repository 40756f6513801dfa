//! Error types for the control API.
//!
//! [`ApiError`] maps bridge failures onto HTTP statuses and renders them
//! as `{"error": ..., "status": ...}` JSON bodies.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sillyworld_core::BridgeError;

/// Errors that can occur in the control API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The requested world or timeline does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request is well-formed but cannot be served in the current
    /// state (no active timeline, nothing to send, no snapshot).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The request body or path is invalid.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A collaborator (game, chat front-end) failed.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        let message = err.to_string();
        match err {
            BridgeError::UnknownWorld(_) | BridgeError::UnknownTimeline { .. } => Self::NotFound(message),
            BridgeError::NoActiveTimeline(_) | BridgeError::NothingToSend(_) | BridgeError::NoSnapshot(_) => {
                Self::Conflict(message)
            }
            BridgeError::Collaborator(_) | BridgeError::Reconcile(_) => Self::Upstream(message),
            BridgeError::Lore(_) => Self::Internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
