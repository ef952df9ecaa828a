//! Upload admission and on-disk storage.
//!
//! # Responsibilities
//! - Refuse (silently) declared MIME types outside the allow-list
//! - Name files with a random UUID plus the original extension
//! - Stream bytes to disk with a hard size cap
//! - Hand back a guard that deletes the file unless it is committed
//!
//! # Design Decisions
//! - Nothing from the client's filename reaches the disk name except an
//!   alphanumeric extension
//! - `create_new` so a name collision fails instead of overwriting
//! - The cap is checked per chunk, memory stays bounded by one chunk

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use axum::body::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::error::{ApiError, ApiResult};

/// Longest extension carried over from the original filename.
const MAX_EXTENSION_LEN: usize = 10;

/// A file admitted and written by [`UploadStorage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Generated name on disk.
    pub file_name: String,
    /// Client-supplied name. Display only.
    pub original_name: String,
    /// Declared MIME type.
    pub mime_type: String,
    /// Bytes written.
    pub size: u64,
    /// Absolute path on disk.
    pub path: PathBuf,
}

/// What the client declared about an upload before any bytes are read.
#[derive(Debug, Clone)]
pub struct UploadMeta {
    pub original_name: String,
    pub mime_type: String,
}

/// A stored file awaiting validation.
///
/// Dropping it without [`commit`](Self::commit) deletes the file, so a
/// cancelled request cannot leave an unvalidated file behind.
#[derive(Debug)]
pub struct PendingUpload {
    file: UploadedFile,
    armed: bool,
}

impl PendingUpload {
    pub fn file(&self) -> &UploadedFile {
        &self.file
    }

    /// Keep the file.
    pub fn commit(mut self) -> UploadedFile {
        self.armed = false;
        self.file.clone()
    }

    /// Delete the file now. A file that is already gone counts as deleted.
    pub async fn discard(mut self) -> io::Result<()> {
        self.armed = false;
        match tokio::fs::remove_file(&self.file.path).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

impl Drop for PendingUpload {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.file.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %self.file.path.display(), error = %e, "Failed to remove abandoned upload");
            }
        }
    }
}

/// Writes admitted uploads into the upload directory.
#[derive(Debug, Clone)]
pub struct UploadStorage {
    dir: PathBuf,
    allowed: HashSet<String>,
    max_size: u64,
}

impl UploadStorage {
    pub fn new(config: &UploadConfig) -> io::Result<Self> {
        Ok(Self {
            dir: std::path::absolute(&config.dir)?,
            allowed: config
                .allowed_mime_types
                .iter()
                .map(|m| m.to_ascii_lowercase())
                .collect(),
            max_size: config.max_size,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Per-file cap enforced while streaming.
    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Create the upload directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// Whether a declared MIME type may be stored. Parameters are ignored.
    pub fn is_allowed(&self, mime_type: &str) -> bool {
        let essence = mime_type.split(';').next().unwrap_or_default().trim();
        self.allowed.contains(&essence.to_ascii_lowercase())
    }

    /// Store an upload.
    ///
    /// Returns `Ok(None)` without reading the stream when the declared type is
    /// not allowed. Stream errors are passed through after the partial file is
    /// removed.
    pub async fn admit<S>(&self, meta: UploadMeta, stream: S) -> ApiResult<Option<PendingUpload>>
    where
        S: Stream<Item = ApiResult<Bytes>>,
    {
        if !self.is_allowed(&meta.mime_type) {
            tracing::info!(
                mime_type = %meta.mime_type,
                original_name = %meta.original_name,
                "Upload type not admitted"
            );
            return Ok(None);
        }

        let file_name = generate_name(&meta.original_name);
        let path = self.dir.join(&file_name);
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(ApiError::StorageIo)?;

        let mut pending = PendingUpload {
            file: UploadedFile {
                file_name,
                original_name: meta.original_name,
                mime_type: meta.mime_type,
                size: 0,
                path,
            },
            armed: true,
        };

        let mut stream = std::pin::pin!(stream);
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => return Err(abandon(pending, e).await),
            };

            written += chunk.len() as u64;
            if written > self.max_size {
                return Err(abandon(pending, ApiError::TooLarge { max: self.max_size }).await);
            }
            if let Err(e) = file.write_all(&chunk).await {
                return Err(abandon(pending, ApiError::StorageIo(e)).await);
            }
        }

        if let Err(e) = file.flush().await {
            return Err(abandon(pending, ApiError::StorageIo(e)).await);
        }
        drop(file);

        pending.file.size = written;
        tracing::debug!(
            file_name = %pending.file.file_name,
            size = written,
            "Upload stored"
        );
        Ok(Some(pending))
    }
}

async fn abandon(pending: PendingUpload, cause: ApiError) -> ApiError {
    match pending.discard().await {
        Ok(()) => cause,
        Err(e) => ApiError::StorageIo(e),
    }
}

/// Random name that keeps the original extension when it is plain alphanumerics.
pub fn generate_name(original_name: &str) -> String {
    let id = Uuid::new_v4();
    match extension(original_name) {
        Some(ext) => format!("{id}.{ext}"),
        None => id.to_string(),
    }
}

fn extension(original_name: &str) -> Option<&str> {
    let base = original_name.rsplit(|c| c == '/' || c == '\\').next()?;
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty()
        || ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn storage(dir: &Path, max_size: u64) -> UploadStorage {
        UploadStorage::new(&UploadConfig {
            dir: dir.to_string_lossy().into_owned(),
            max_size,
            ..UploadConfig::default()
        })
        .unwrap()
    }

    fn meta(name: &str, mime: &str) -> UploadMeta {
        UploadMeta {
            original_name: name.into(),
            mime_type: mime.into(),
        }
    }

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = ApiResult<Bytes>> {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    fn file_count(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_generated_names() {
        let name = generate_name("holiday.JPG");
        assert!(name.ends_with(".JPG"));
        assert_eq!(name.len(), 36 + 4);
        assert_ne!(generate_name("a.png"), generate_name("a.png"));

        for hostile in [
            "../../etc/passwd",
            "evil.p/ng",
            "x.png\\..\\..",
            ".png",
            "noext",
            "a.sh;rm",
            "a.verylongextension",
        ] {
            let name = generate_name(hostile);
            assert_eq!(name.len(), 36, "{hostile} leaked into {name}");
        }
        assert!(generate_name("dir/photo.gif").ends_with(".gif"));
    }

    #[test]
    fn test_mime_allow_list() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = storage(tmp.path(), 1024);
        assert!(storage.is_allowed("image/png"));
        assert!(storage.is_allowed("IMAGE/JPEG"));
        assert!(storage.is_allowed("image/svg+xml; charset=utf-8"));
        assert!(storage.is_allowed("image/jpg"));
        assert!(!storage.is_allowed("image/webp"));
        assert!(!storage.is_allowed("text/html"));
        assert!(!storage.is_allowed(""));
    }

    #[tokio::test]
    async fn test_disallowed_type_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = storage(tmp.path(), 1024);
        let result = storage
            .admit(meta("page.html", "text/html"), chunks(&["<html>"]))
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(file_count(tmp.path()), 0);
    }

    #[tokio::test]
    async fn test_stores_and_commits() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = storage(tmp.path(), 1024);
        let pending = storage
            .admit(meta("pic.png", "image/png"), chunks(&["abc", "def"]))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(pending.file().size, 6);
        assert_eq!(pending.file().original_name, "pic.png");
        let file = pending.commit();
        assert_eq!(std::fs::read(&file.path).unwrap(), b"abcdef");
        assert_eq!(file.path.parent().unwrap(), tmp.path());
    }

    #[tokio::test]
    async fn test_drop_without_commit_deletes() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = storage(tmp.path(), 1024);
        let pending = storage
            .admit(meta("pic.png", "image/png"), chunks(&["abc"]))
            .await
            .unwrap()
            .unwrap();
        let path = pending.file().path.clone();
        assert!(path.exists());

        drop(pending);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_cap_enforced_while_streaming() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = storage(tmp.path(), 4);
        let result = storage
            .admit(meta("pic.png", "image/png"), chunks(&["abc", "def"]))
            .await;
        assert!(matches!(result, Err(ApiError::TooLarge { max: 4 })));
        assert_eq!(file_count(tmp.path()), 0);
    }

    #[tokio::test]
    async fn test_cap_boundary() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = storage(tmp.path(), 6);

        let pending = storage
            .admit(meta("pic.png", "image/png"), chunks(&["abc", "def"]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.file().size, 6);
        pending.commit();

        let result = storage
            .admit(meta("pic.png", "image/png"), chunks(&["abc", "defg"]))
            .await;
        assert!(matches!(result, Err(ApiError::TooLarge { max: 6 })));
        assert_eq!(file_count(tmp.path()), 1);
    }

    #[tokio::test]
    async fn test_stream_error_removes_partial_file() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = storage(tmp.path(), 1024);
        let failing = stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Err(ApiError::MalformedUpload("connection reset".into())),
        ]);
        let result = storage.admit(meta("pic.png", "image/png"), failing).await;
        assert!(matches!(result, Err(ApiError::MalformedUpload(_))));
        assert_eq!(file_count(tmp.path()), 0);
    }
}
