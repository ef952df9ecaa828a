//! Upload Shield library.
//!
//! An HTTP backend that hardens ingress (rate limiting, security headers,
//! CORS, body limits), strips markup and NoSQL operator keys from request
//! payloads, and accepts image uploads that are validated before being served
//! from the static root.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod sanitize;
pub mod security;
pub mod static_files;
pub mod upload;

pub use config::AppConfig;
pub use error::{ApiError, ApiResult};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
