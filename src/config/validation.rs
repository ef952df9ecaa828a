//! Configuration validation.
//!
//! Serde handles syntax; this module checks values that parse fine but cannot
//! work together. Every problem is reported, not just the first one.

use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::config::schema::AppConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("upload.min_size ({min}) must be below upload.max_size ({max})")]
    SizeBounds { min: u64, max: u64 },

    #[error("upload.allowed_mime_types must not be empty")]
    EmptyMimeList,

    #[error("upload.public_prefix must start with '/', got {0:?}")]
    PublicPrefix(String),

    #[error("upload.dir {dir:?} is not inside static_files.root {root:?}")]
    UploadDirOutsideRoot { dir: String, root: String },

    #[error("upload.public_prefix {prefix:?} does not match upload.dir, which is served at {expected:?}")]
    PrefixMismatch { prefix: String, expected: String },

    #[error("cors.allowed_origin {0:?} is not a valid origin")]
    InvalidOrigin(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero { field: "timeouts.request_secs" });
    }

    if config.rate_limit.enabled {
        if config.rate_limit.window_secs == 0 {
            errors.push(ValidationError::Zero { field: "rate_limit.window_secs" });
        }
        if config.rate_limit.max_requests == 0 {
            errors.push(ValidationError::Zero { field: "rate_limit.max_requests" });
        }
    }

    if config.security.max_body_size == 0 {
        errors.push(ValidationError::Zero { field: "security.max_body_size" });
    }

    let upload = &config.upload;
    if upload.min_size >= upload.max_size {
        errors.push(ValidationError::SizeBounds {
            min: upload.min_size,
            max: upload.max_size,
        });
    }
    if upload.allowed_mime_types.is_empty() {
        errors.push(ValidationError::EmptyMimeList);
    }
    if !upload.public_prefix.starts_with('/') {
        errors.push(ValidationError::PublicPrefix(upload.public_prefix.clone()));
    }
    match served_at(Path::new(&upload.dir), Path::new(&config.static_files.root)) {
        None => errors.push(ValidationError::UploadDirOutsideRoot {
            dir: upload.dir.clone(),
            root: config.static_files.root.clone(),
        }),
        Some(expected)
            if upload.public_prefix.starts_with('/')
                && upload.public_prefix.trim_end_matches('/') != expected.trim_end_matches('/') =>
        {
            errors.push(ValidationError::PrefixMismatch {
                prefix: upload.public_prefix.clone(),
                expected,
            });
        }
        Some(_) => {}
    }

    match url::Url::parse(&config.cors.allowed_origin) {
        Ok(origin) if origin.has_host() && origin.path() == "/" => {}
        _ => errors.push(ValidationError::InvalidOrigin(config.cors.allowed_origin.clone())),
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// URL path under which the static server exposes `dir`, or `None` when `dir`
/// is not inside `root`. Lexical only; the filesystem is not consulted.
fn served_at(dir: &Path, root: &Path) -> Option<String> {
    fn clean(path: &Path) -> PathBuf {
        let mut out = PathBuf::new();
        for component in path.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    out.pop();
                }
                other => out.push(other.as_os_str()),
            }
        }
        out
    }

    let dir = clean(dir);
    let relative = dir.strip_prefix(clean(root)).ok()?;
    let segments: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    Some(format!("/{}", segments.join("/")))
}
