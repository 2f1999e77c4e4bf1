//! HTTP error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use crate::error::Error;
use crate::registry::RegistryError;
use crate::stream_log::LogError;

/// Error returned from HTTP handlers as `{"error": "..."}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// 404 for a stream that does not exist
    pub fn stream_not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Publisher live stream not found")
    }

    /// Response status
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Registry(RegistryError::NotFound(_))
            | Error::Registry(RegistryError::InvalidPublisherId(_))
            | Error::Log(LogError::Removed) => Self::stream_not_found(),
            Error::Registry(RegistryError::AlreadyPublishing(_)) => {
                Self::new(StatusCode::CONFLICT, err.to_string())
            }
            Error::Handshake(_) => Self::new(StatusCode::BAD_REQUEST, err.to_string()),
            _ => {
                tracing::error!(error = %err, "Request failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        Error::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
