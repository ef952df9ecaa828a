//! Sanitizer middleware.
//!
//! Two layers, installed in this order:
//! 1. [`sanitize_markup`] rewrites body, query and path segments in place and
//!    always lets the request through.
//! 2. [`reject_operator_keys`] inspects body and query and answers 400 on the
//!    first operator key without running the rest of the stack.
//!
//! The markup layer leaves its parsed payload in the request extensions so the
//! operator layer does not parse the body a second time.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::SecurityConfig;
use crate::error::{ApiError, ApiResult};
use crate::observability::metrics;
use crate::sanitize::markup::MarkupSanitizer;
use crate::sanitize::operator;
use crate::sanitize::payload::{IncomingPayload, PayloadBody};

/// Shared state for both sanitizer layers.
pub struct SanitizeState {
    pub markup: MarkupSanitizer,
    pub max_body_size: usize,
}

impl SanitizeState {
    pub fn new(config: &SecurityConfig) -> Self {
        Self {
            markup: MarkupSanitizer::new(),
            max_body_size: config.max_body_size,
        }
    }

    /// Markup pass over body, query and params.
    pub fn sanitize_markup(&self, payload: &mut IncomingPayload) -> bool {
        let mut changed = match payload.body.as_mut() {
            Some(PayloadBody::Json(value)) => self.markup.sanitize_value(value),
            Some(PayloadBody::Form(pairs)) => self.markup.sanitize_pairs(pairs),
            None => false,
        };
        changed |= self.markup.sanitize_pairs(&mut payload.query);
        changed |= self.markup.sanitize_value(&mut payload.params);
        changed
    }

    /// Operator pass over body and query. Path segments are not keys.
    pub fn check_operators(&self, payload: &IncomingPayload) -> Result<(), operator::InjectionDetected> {
        match &payload.body {
            Some(PayloadBody::Json(value)) => operator::check(value)?,
            Some(PayloadBody::Form(pairs)) => operator::check(&pairs.expand())?,
            None => {}
        }
        operator::check(&payload.query.expand())
    }
}

/// Strip markup from every string the client sent.
pub async fn sanitize_markup(
    State(state): State<Arc<SanitizeState>>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    let (mut parts, body) = request.into_parts();
    let (mut payload, body) = IncomingPayload::extract(&parts, body, state.max_body_size).await?;

    let body = if state.sanitize_markup(&mut payload) {
        tracing::debug!(path = %parts.uri.path(), "Markup stripped from request payload");
        payload.apply(&mut parts)?.unwrap_or(body)
    } else {
        body
    };

    parts.extensions.insert(payload);
    Ok(next.run(Request::from_parts(parts, body)).await)
}

/// Reject any payload carrying operator keys.
pub async fn reject_operator_keys(
    State(state): State<Arc<SanitizeState>>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();

    let (payload, body) = match parts.extensions.remove::<IncomingPayload>() {
        Some(payload) => (payload, body),
        None => match IncomingPayload::extract(&parts, body, state.max_body_size).await {
            Ok(extracted) => extracted,
            Err(e) => return e.into_response(),
        },
    };

    if let Err(detected) = state.check_operators(&payload) {
        tracing::warn!(
            path = %parts.uri.path(),
            key = %detected.key,
            location = %detected.location,
            "Operator key rejected"
        );
        metrics::record_injection_blocked();
        return ApiError::InjectionDetected.into_response();
    }

    next.run(Request::from_parts(parts, body)).await
}
