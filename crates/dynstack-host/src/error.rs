//! Error types for the control API.
//!
//! [`ControlError`] maps session and settings failures to HTTP responses
//! with a JSON body of the form `{ "error": ..., "status": ... }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::resolver::SettingsError;
use crate::session::SessionError;

/// Errors that can occur in the control API layer.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// The request was malformed (bad settings, bad query).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request conflicts with the current session.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<SettingsError> for ControlError {
    fn from(e: SettingsError) -> Self {
        match e {
            SettingsError::PresetNotFound { .. } => Self::NotFound(e.to_string()),
            SettingsError::Decode { .. } | SettingsError::Invalid { .. } => {
                Self::BadRequest(e.to_string())
            }
        }
    }
}

impl From<SessionError> for ControlError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::AlreadyActive { .. } => Self::Conflict(e.to_string()),
            SessionError::Settings { source } => source.into(),
            SessionError::Engine { .. } | SessionError::RemotePolicy { .. } => {
                Self::Internal(e.to_string())
            }
        }
    }
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
