//! Book metadata extraction and fallback resolution.

use crate::catalog::UNKNOWN_AUTHOR;
use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use epub::doc::EpubDoc;
use std::path::Path;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

/// Raw fields read from a package. Any of them may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    /// `data:<mime>;base64,<payload>` URI.
    pub cover_image: Option<String>,
}

pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<RawMetadata>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EpubMetadataExtractor;

impl MetadataExtractor for EpubMetadataExtractor {
    fn extract(&self, path: &Path) -> Result<RawMetadata> {
        let mut doc =
            EpubDoc::new(path).with_context(|| format!("Failed to open EPUB at {}", path.display()))?;
        let title = doc.mdata("title").map(|m| m.value.clone());
        let author = doc.mdata("creator").map(|m| m.value.clone());
        let cover_image = doc
            .get_cover()
            .map(|(bytes, mime)| cover_data_uri(&bytes, &mime));
        debug!(
            path = %path.display(),
            has_title = title.is_some(),
            has_author = author.is_some(),
            has_cover = cover_image.is_some(),
            "Extracted EPUB metadata"
        );
        Ok(RawMetadata {
            title,
            author,
            cover_image,
        })
    }
}

/// Encode cover bytes as a data URI, sniffing the image format when the
/// manifest omits or garbles the media type.
pub fn cover_data_uri(bytes: &[u8], declared_mime: &str) -> String {
    let declared = declared_mime.trim();
    let mime = if declared.starts_with("image/") {
        declared.to_string()
    } else {
        match image::guess_format(bytes) {
            Ok(format) => format.to_mime_type().to_string(),
            Err(_) => "application/octet-stream".to_string(),
        }
    };
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataQuality {
    Complete,
    /// Extraction failed outright and every field came from a fallback.
    Degraded { reason: String },
}

/// Metadata after fallbacks have been applied; every field is usable as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookMetadata {
    pub title: String,
    pub author: String,
    pub cover_image: Option<String>,
}

impl BookMetadata {
    pub fn resolve(path: &Path, raw: RawMetadata) -> Self {
        Self {
            title: clean_field(raw.title).unwrap_or_else(|| fallback_title(path)),
            author: clean_field(raw.author).unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
            cover_image: raw.cover_image.filter(|uri| !uri.trim().is_empty()),
        }
    }

    pub fn fallback(path: &Path) -> Self {
        Self::resolve(path, RawMetadata::default())
    }
}

/// The file name, extension included, or the whole path when it has none.
pub fn fallback_title(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Trim, collapse internal whitespace and NFC-normalize; blank becomes `None`.
fn clean_field(value: Option<String>) -> Option<String> {
    let value = value?;
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    Some(collapsed.nfc().collect())
}
