//! Request body limits.
//!
//! JSON and urlencoded bodies are capped by the sanitizer while it buffers
//! them (`security.max_body_size`). Multipart upload bodies stream, so the
//! upload route gets its own transport cap here and the storage layer enforces
//! the per-file cap while writing.

use axum::extract::DefaultBodyLimit;
use tower_http::limit::RequestBodyLimitLayer;

use crate::config::UploadConfig;

/// Room for multipart boundaries, part headers and small text fields.
pub const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Transport cap for the upload route.
pub fn upload_body_limit(config: &UploadConfig) -> RequestBodyLimitLayer {
    let file_cap = usize::try_from(config.max_size).unwrap_or(usize::MAX);
    RequestBodyLimitLayer::new(file_cap.saturating_add(MULTIPART_OVERHEAD))
}

/// Lift axum's built-in 2MB extractor default; [`upload_body_limit`] replaces it.
pub fn lift_default_limit() -> DefaultBodyLimit {
    DefaultBodyLimit::disable()
}
