//! Request-terminating errors and their HTTP rendering.
//!
//! Every variant is terminal for the current request. Client errors carry a
//! fixed message; server errors log their source and answer with a generic
//! body so filesystem details never reach the caller.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Fixed message returned when an operator key is found in a payload.
pub const INJECTION_MESSAGE: &str = "Potential NoSQL injection detected";

/// Errors produced by the ingress, sanitization, static and upload paths.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No file uploaded")]
    NoFileProvided,

    #[error("File type is not allowed")]
    UnsupportedFileType,

    #[error("File must be at least {min} bytes")]
    TooSmall { min: u64 },

    #[error("File must not exceed {max} bytes")]
    TooLarge { max: u64 },

    #[error("File is not a valid image")]
    NotAnImage,

    #[error("Malformed multipart body: {0}")]
    MalformedUpload(String),

    #[error("{}", INJECTION_MESSAGE)]
    InjectionDetected,

    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("{0}")]
    RateLimited(String),

    #[error("static file I/O failed: {0}")]
    StaticIo(#[source] std::io::Error),

    #[error("upload storage I/O failed: {0}")]
    StorageIo(#[source] std::io::Error),
}

/// Result type for request handling.
pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NoFileProvided
            | ApiError::UnsupportedFileType
            | ApiError::TooSmall { .. }
            | ApiError::TooLarge { .. }
            | ApiError::NotAnImage
            | ApiError::MalformedUpload(_)
            | ApiError::InjectionDetected
            | ApiError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::StaticIo(_) | ApiError::StorageIo(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ErrorBody { message })).into_response()
    }
}
