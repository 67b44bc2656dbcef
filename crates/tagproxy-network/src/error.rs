//! HTTP error mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::net::SocketAddr;
use tagproxy_device::DeviceError;
use thiserror::Error;
use tracing::{error, warn};

/// Error returned by a request handler.
///
/// Serialized as `{"error": <kind>, "message": <text>}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Neither a tag nor the emulation file is available (412).
    #[error("No tag present")]
    NoTagPresent,

    /// The request body is not acceptable (400).
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// The request conflicts with the device state (409).
    #[error("{0}")]
    Conflict(String),

    /// No such resource (404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other device failure (500).
    #[error(transparent)]
    Device(DeviceError),

    /// Unexpected server failure (500).
    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NoTagPresent => StatusCode::PRECONDITION_FAILED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Device(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::NoTagPresent => "no_tag_present",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Conflict(_) => "conflict",
            ApiError::NotFound(_) => "not_found",
            ApiError::Device(_) => "device_error",
            ApiError::Internal(_) => "internal_error",
        }
    }

    /// Map an emulation toggle failure: a missing file is a conflict.
    pub fn from_toggle(error: DeviceError) -> Self {
        match error {
            DeviceError::EmulationFileMissing { .. } => ApiError::Conflict(error.to_string()),
            other => other.into(),
        }
    }
}

impl From<DeviceError> for ApiError {
    fn from(error: DeviceError) -> Self {
        match error {
            DeviceError::NoTagPresent => ApiError::NoTagPresent,
            other => ApiError::Device(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = self.kind(), error = %self, "Request failed");
        } else {
            warn!(kind = self.kind(), error = %self, "Request rejected");
        }
        let body = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Errors starting or running the HTTP server.
#[derive(Debug, Error)]
pub enum HttpServerError {
    /// Failed to bind to address
    #[error("Failed to bind to {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Low-level I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
