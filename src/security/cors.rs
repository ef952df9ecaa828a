//! Cross-origin policy.

use axum::http::HeaderValue;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};

use crate::config::CorsConfig;

/// Build the CORS layer for the single configured origin.
///
/// Credentials forbid wildcard methods and headers, so both are mirrored from
/// the preflight request instead.
pub fn cors_layer(config: &CorsConfig) -> Result<CorsLayer, axum::http::header::InvalidHeaderValue> {
    let origin = HeaderValue::from_str(&config.allowed_origin)?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(config.allow_credentials))
}
