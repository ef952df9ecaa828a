//! Request data as one tree: body, query and path segments.

use axum::{
    body::{Body, Bytes},
    http::{header, request::Parts, uri::PathAndQuery, HeaderValue, Uri},
};
use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::sanitize::form::FormPairs;

/// A parsed request body.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadBody {
    Json(Value),
    Form(FormPairs),
}

impl PayloadBody {
    fn encode(&self) -> ApiResult<Bytes> {
        match self {
            PayloadBody::Json(value) => serde_json::to_vec(value)
                .map(Bytes::from)
                .map_err(|e| ApiError::MalformedBody(e.to_string())),
            PayloadBody::Form(pairs) => Ok(Bytes::from(pairs.encode())),
        }
    }
}

/// Everything a client can put into a request besides headers.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingPayload {
    /// Parsed JSON or urlencoded body. `None` for other or empty bodies.
    pub body: Option<PayloadBody>,
    /// Query string pairs as sent.
    pub query: FormPairs,
    /// Decoded path segments, always a sequence of strings.
    pub params: Value,
}

enum BodyKind {
    Json,
    Form,
}

fn body_kind(parts: &Parts) -> Option<BodyKind> {
    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)?
        .to_str()
        .ok()?
        .to_ascii_lowercase();
    let essence = content_type.split(';').next().unwrap_or_default().trim();

    if essence == "application/json" || essence.ends_with("+json") {
        Some(BodyKind::Json)
    } else if essence == "application/x-www-form-urlencoded" {
        Some(BodyKind::Form)
    } else {
        None
    }
}

impl IncomingPayload {
    /// Read the payload out of a request.
    ///
    /// JSON and urlencoded bodies are buffered up to `limit` bytes and handed
    /// back as a fresh `Body`; any other body is returned untouched so uploads
    /// keep streaming.
    pub async fn extract(parts: &Parts, body: Body, limit: usize) -> ApiResult<(Self, Body)> {
        let query = FormPairs::parse(parts.uri.query().unwrap_or_default());
        let params = Value::Array(
            raw_segments(parts.uri.path())
                .map(|segment| Value::String(decode_segment(segment)))
                .collect(),
        );

        let Some(kind) = body_kind(parts) else {
            return Ok((Self { body: None, query, params }, body));
        };

        let declared = parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > limit) {
            return Err(ApiError::PayloadTooLarge { limit });
        }

        // Past the declared-length check a read failure is the limit tripping on
        // a chunked body (or a client that already went away).
        let bytes = axum::body::to_bytes(body, limit)
            .await
            .map_err(|_| ApiError::PayloadTooLarge { limit })?;

        let parsed = if bytes.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            match kind {
                BodyKind::Json => Some(PayloadBody::Json(
                    serde_json::from_slice(&bytes)
                        .map_err(|e| ApiError::MalformedBody(e.to_string()))?,
                )),
                BodyKind::Form => {
                    let text = std::str::from_utf8(&bytes)
                        .map_err(|e| ApiError::MalformedBody(e.to_string()))?;
                    Some(PayloadBody::Form(FormPairs::parse(text)))
                }
            }
        };

        Ok((Self { body: parsed, query, params }, Body::from(bytes)))
    }

    /// Write the payload back into the request, replacing URI and body.
    pub fn apply(&self, parts: &mut Parts) -> ApiResult<Option<Body>> {
        let path = self.rebuild_path(parts.uri.path());
        let query = self.query.encode();
        let path_and_query = if query.is_empty() {
            path
        } else {
            format!("{path}?{query}")
        };

        let mut uri_parts = parts.uri.clone().into_parts();
        uri_parts.path_and_query = Some(
            PathAndQuery::try_from(path_and_query)
                .map_err(|e| ApiError::MalformedBody(e.to_string()))?,
        );
        parts.uri = Uri::from_parts(uri_parts).map_err(|e| ApiError::MalformedBody(e.to_string()))?;

        let Some(body) = &self.body else {
            return Ok(None);
        };
        let bytes = body.encode()?;
        parts
            .headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
        Ok(Some(Body::from(bytes)))
    }

    /// Re-encode only the segments whose decoded value changed.
    fn rebuild_path(&self, original: &str) -> String {
        let sanitized = self.params.as_array();
        let segments: Vec<String> = raw_segments(original)
            .enumerate()
            .map(|(index, raw)| {
                match sanitized.and_then(|s| s.get(index)).and_then(Value::as_str) {
                    Some(value) if value != decode_segment(raw) => {
                        urlencoding::encode(value).into_owned()
                    }
                    _ => raw.to_string(),
                }
            })
            .collect();
        format!("/{}", segments.join("/"))
    }
}

fn raw_segments(path: &str) -> impl Iterator<Item = &str> {
    path.strip_prefix('/').unwrap_or(path).split('/')
}

fn decode_segment(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}
