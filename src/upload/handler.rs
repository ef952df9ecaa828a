//! `POST /upload` handler.

use std::sync::Arc;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    Json,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::observability::metrics;
use crate::upload::storage::{UploadMeta, UploadedFile};
use crate::upload::UploadService;

/// Body of a `201 Created` upload response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// Public path of the stored file, e.g. `/temp/<uuid>.png`.
    pub file_name: String,
    pub original_name: String,
}

/// Accept one image from the configured multipart field.
pub async fn upload_file(
    State(service): State<Arc<UploadService>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    let result = match multipart {
        Ok(mut multipart) => receive(&service, &mut multipart).await,
        Err(rejection) => {
            tracing::debug!(reason = %rejection.body_text(), "Upload is not multipart");
            Err(ApiError::NoFileProvided)
        }
    };

    let file = match result {
        Ok(file) => file,
        Err(e) => {
            metrics::record_upload(if e.status().is_server_error() { "error" } else { "rejected" });
            return Err(e);
        }
    };

    metrics::record_upload("accepted");
    tracing::info!(
        file_name = %file.file_name,
        original_name = %file.original_name,
        size = file.size,
        "Upload accepted"
    );
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            file_name: service.public_path(&file.file_name),
            original_name: file.original_name,
        }),
    ))
}

async fn receive(service: &UploadService, multipart: &mut Multipart) -> ApiResult<UploadedFile> {
    let max = service.storage.max_size();
    // Set when a file arrived but its declared type was refused.
    let mut filtered = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max))?
    {
        if field.name() != Some(service.field_name.as_str()) {
            continue;
        }
        let Some(original_name) = field.file_name().map(str::to_owned) else {
            continue;
        };
        let meta = UploadMeta {
            original_name,
            mime_type: field.content_type().unwrap_or_default().to_owned(),
        };

        let chunks = field.map(|chunk| chunk.map_err(|e| multipart_error(e, max)));
        match service.storage.admit(meta, chunks).await? {
            Some(pending) => return service.validator.validate(pending).await,
            None => filtered = true,
        }
    }

    Err(if filtered {
        ApiError::UnsupportedFileType
    } else {
        ApiError::NoFileProvided
    })
}

/// Map a multipart read failure. The transport cap surfaces as 413 inside the
/// multipart stream and is reported as an oversized file.
fn multipart_error(error: MultipartError, max: u64) -> ApiError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::TooLarge { max }
    } else {
        ApiError::MalformedUpload(error.body_text())
    }
}
