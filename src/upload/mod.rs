//! Upload subsystem.
//!
//! # Data Flow
//! ```text
//! POST /upload (multipart)
//!     → handler.rs (find the file field)
//!     → storage.rs (MIME allow-list, UUID name, capped stream to disk)
//!     → validator.rs (size window, dimension probe, delete or commit)
//!     → 201 { fileName, originalName } | 400 { message }
//! ```
//!
//! # Design Decisions
//! - A file is public only after validation commits it
//! - Every failure after the first byte is written deletes the file

pub mod handler;
pub mod storage;
pub mod validator;

use std::io;
use std::sync::Arc;

use axum::{routing::post, Router};

use crate::config::UploadConfig;
use crate::security::limits::{lift_default_limit, upload_body_limit};

pub use handler::{upload_file, UploadResponse};
pub use storage::{PendingUpload, UploadMeta, UploadStorage, UploadedFile};
pub use validator::UploadValidator;

/// Everything the upload route needs, shared across requests.
#[derive(Debug)]
pub struct UploadService {
    pub storage: UploadStorage,
    pub validator: UploadValidator,
    pub field_name: String,
    pub public_prefix: String,
}

impl UploadService {
    pub fn new(config: &UploadConfig) -> io::Result<Self> {
        Ok(Self {
            storage: UploadStorage::new(config)?,
            validator: UploadValidator::new(config),
            field_name: config.field_name.clone(),
            public_prefix: config.public_prefix.clone(),
        })
    }

    /// Public URL path of a stored file.
    pub fn public_path(&self, file_name: &str) -> String {
        format!("{}/{}", self.public_prefix.trim_end_matches('/'), file_name)
    }
}

/// `POST /upload` with its own body cap.
pub fn upload_router(service: Arc<UploadService>, config: &UploadConfig) -> Router {
    Router::new()
        .route("/upload", post(upload_file))
        .layer(lift_default_limit())
        .layer(upload_body_limit(config))
        .with_state(service)
}
