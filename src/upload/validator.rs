//! Post-storage upload validation.
//!
//! # Responsibilities
//! - Enforce the byte-size window on the stored file
//! - Prove the bytes are an image by decoding its dimensions
//! - Refuse names the static server would hand out as something other than an image
//! - Delete the file on any failure, commit it on success
//!
//! # Design Decisions
//! - Raster formats are sniffed from content, never from the declared type
//! - SVG must parse as an XML document whose root element is `<svg>`; size comes
//!   from its `width`/`height`, then `viewBox`
//! - Decoding runs on the blocking pool; a panic there is a failed decode

use std::io::Cursor;
use std::path::Path;
use std::sync::LazyLock;

use image::ImageReader;
use regex::Regex;
use roxmltree::{Document, Node, ParsingOptions};

use crate::config::UploadConfig;
use crate::error::{ApiError, ApiResult};
use crate::upload::storage::{PendingUpload, UploadedFile};

const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";

/// Element cap for SVG parsing.
const SVG_NODES_LIMIT: u32 = 100_000;

/// An absolute SVG length: a number with an optional absolute unit. Percentages
/// and other relative units fall through to `viewBox`.
static SVG_LENGTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([0-9]*\.?[0-9]+(?:[eE][-+]?[0-9]+)?)\s*(?:px|pt|pc|mm|cm|in)?\s*$")
        .expect("valid svg length pattern")
});

/// Pixel (or user-unit, for SVG) dimensions of an accepted image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
}

/// Checks stored uploads before they are made public.
#[derive(Debug, Clone)]
pub struct UploadValidator {
    min_size: u64,
    max_size: u64,
}

impl UploadValidator {
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            min_size: config.min_size,
            max_size: config.max_size,
        }
    }

    /// Commit the upload if it passes, otherwise delete it and report why.
    ///
    /// A failed delete is reported as [`ApiError::StorageIo`] in place of the
    /// validation error.
    pub async fn validate(&self, pending: PendingUpload) -> ApiResult<UploadedFile> {
        match self.inspect(pending.file()).await {
            Ok(dimensions) => {
                tracing::debug!(
                    file_name = %pending.file().file_name,
                    width = dimensions.width,
                    height = dimensions.height,
                    "Upload validated"
                );
                Ok(pending.commit())
            }
            Err(e) => {
                tracing::info!(
                    file_name = %pending.file().file_name,
                    original_name = %pending.file().original_name,
                    reason = %e,
                    "Upload rejected"
                );
                match pending.discard().await {
                    Ok(()) => Err(e),
                    Err(io) => Err(ApiError::StorageIo(io)),
                }
            }
        }
    }

    async fn inspect(&self, file: &UploadedFile) -> ApiResult<Dimensions> {
        if file.size < self.min_size {
            return Err(ApiError::TooSmall { min: self.min_size });
        }
        if file.size > self.max_size {
            return Err(ApiError::TooLarge { max: self.max_size });
        }

        if !served_as_image(&file.file_name) {
            return Err(ApiError::NotAnImage);
        }

        let bytes = tokio::fs::read(&file.path).await.map_err(ApiError::StorageIo)?;
        match tokio::task::spawn_blocking(move || probe(&bytes)).await {
            Ok(Some(dimensions)) => Ok(dimensions),
            Ok(None) => Err(ApiError::NotAnImage),
            Err(e) => {
                tracing::warn!(error = %e, "Image probe aborted");
                Err(ApiError::NotAnImage)
            }
        }
    }
}

/// Whether the static server would send `file_name` with an image content type
/// (or as an opaque download, for extensions it does not know).
fn served_as_image(file_name: &str) -> bool {
    let Some(ext) = Path::new(file_name).extension().and_then(|e| e.to_str()) else {
        return true;
    };
    match mime_guess::from_ext(ext).first() {
        Some(mime) => mime.type_().as_str() == "image",
        None => true,
    }
}

/// Dimensions of a PNG, JPEG, GIF or SVG image. `None` if the bytes are none of those.
pub fn probe(bytes: &[u8]) -> Option<Dimensions> {
    probe_raster(bytes).or_else(|| probe_svg(bytes))
}

fn probe_raster(bytes: &[u8]) -> Option<Dimensions> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format().ok()?;
    reader.format()?;
    let (width, height) = reader.into_dimensions().ok()?;
    positive(f64::from(width), f64::from(height))
}

fn probe_svg(bytes: &[u8]) -> Option<Dimensions> {
    let text = std::str::from_utf8(bytes).ok()?;
    let options = ParsingOptions {
        allow_dtd: true,
        nodes_limit: SVG_NODES_LIMIT,
    };
    // Anything but a prolog, comments, a doctype or whitespace around the root
    // element is a parse error.
    let document = Document::parse_with_options(text, options).ok()?;
    let root = document.root_element();
    let name = root.tag_name();
    if name.name() != "svg" || !matches!(name.namespace(), None | Some(SVG_NAMESPACE)) {
        return None;
    }

    if let (Some(width), Some(height)) = (length(root, "width"), length(root, "height")) {
        return positive(width, height);
    }

    let view_box: Vec<f64> = root
        .attribute("viewBox")?
        .split(|c: char| c == ',' || c.is_ascii_whitespace())
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    match view_box[..] {
        [_, _, width, height] => positive(width, height),
        _ => None,
    }
}

fn length(node: Node<'_, '_>, attribute: &str) -> Option<f64> {
    let value = node.attribute(attribute)?;
    SVG_LENGTH.captures(value)?.get(1)?.as_str().parse().ok()
}

fn positive(width: f64, height: f64) -> Option<Dimensions> {
    (width > 0.0 && height > 0.0).then_some(Dimensions { width, height })
}
