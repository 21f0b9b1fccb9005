//! Path → catalog entry pipeline with content-hash deduplication.

use crate::catalog::{CatalogEntry, CatalogStore, ContentHash};
use crate::error::IngestError;
use crate::hashing::ContentHasher;
use crate::metadata::{BookMetadata, MetadataExtractor, MetadataQuality};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestedBook {
    pub entry: CatalogEntry,
    pub quality: MetadataQuality,
}

/// Per-path progress notifications for a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestProgress {
    Started { index: usize, path: PathBuf },
    Added { index: usize, hash: ContentHash, title: String },
    Duplicate { index: usize, hash: ContentHash, existing_title: String },
    Failed { index: usize, path: PathBuf, reason: String },
}

#[derive(Debug)]
pub struct IngestReport {
    /// One outcome per supported path, in input order.
    pub outcomes: Vec<(PathBuf, Result<IngestedBook, IngestError>)>,
    /// Paths dropped for having an unsupported extension.
    pub skipped: usize,
}

impl IngestReport {
    pub fn added(&self) -> impl Iterator<Item = &IngestedBook> {
        self.outcomes.iter().filter_map(|(_, outcome)| outcome.as_ref().ok())
    }

    pub fn summary(&self) -> String {
        let added = self.added().count();
        let duplicates = self
            .outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, Err(IngestError::Duplicate { .. })))
            .count();
        let failed = self.outcomes.len() - added - duplicates;
        let degraded = self
            .added()
            .filter(|book| matches!(book.quality, MetadataQuality::Degraded { .. }))
            .count();
        format!(
            "added {added} (degraded metadata: {degraded}), duplicates {duplicates}, failed {failed}, skipped {}",
            self.skipped
        )
    }
}

pub fn is_supported(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase()),
        Some(ext) if ext == "epub"
    )
}

pub struct IngestionPipeline {
    hasher: Arc<dyn ContentHasher>,
    extractor: Arc<dyn MetadataExtractor>,
    catalog: Arc<dyn CatalogStore>,
}

impl IngestionPipeline {
    pub fn new(
        hasher: Arc<dyn ContentHasher>,
        extractor: Arc<dyn MetadataExtractor>,
        catalog: Arc<dyn CatalogStore>,
    ) -> Self {
        Self {
            hasher,
            extractor,
            catalog,
        }
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogStore> {
        &self.catalog
    }

    pub fn ingest(&self, path: &Path) -> Result<IngestedBook, IngestError> {
        self.ingest_with_seen(path, &HashSet::new())
    }

    /// Ingest `paths` one at a time in input order. A hash repeated within the
    /// batch is rejected just like one already in the store.
    pub fn ingest_batch<F>(&self, paths: &[PathBuf], mut on_progress: F) -> IngestReport
    where
        F: FnMut(IngestProgress),
    {
        let mut seen: HashSet<ContentHash> = HashSet::new();
        let mut outcomes = Vec::with_capacity(paths.len());
        let mut skipped = 0usize;

        for (index, path) in paths.iter().enumerate() {
            if !is_supported(path) {
                debug!(path = %path.display(), "Skipping unsupported file");
                skipped += 1;
                continue;
            }
            on_progress(IngestProgress::Started {
                index,
                path: path.clone(),
            });
            let outcome = self.ingest_with_seen(path, &seen);
            match &outcome {
                Ok(book) => {
                    seen.insert(book.entry.hash.clone());
                    on_progress(IngestProgress::Added {
                        index,
                        hash: book.entry.hash.clone(),
                        title: book.entry.title.clone(),
                    });
                }
                Err(IngestError::Duplicate {
                    hash,
                    existing_title,
                    ..
                }) => on_progress(IngestProgress::Duplicate {
                    index,
                    hash: hash.clone(),
                    existing_title: existing_title.clone(),
                }),
                Err(err) => on_progress(IngestProgress::Failed {
                    index,
                    path: path.clone(),
                    reason: err.to_string(),
                }),
            }
            outcomes.push((path.clone(), outcome));
        }

        let report = IngestReport { outcomes, skipped };
        info!(total = paths.len(), "{}", report.summary());
        report
    }

    fn ingest_with_seen(
        &self,
        path: &Path,
        seen: &HashSet<ContentHash>,
    ) -> Result<IngestedBook, IngestError> {
        if !is_supported(path) {
            return Err(IngestError::UnsupportedExtension {
                path: path.to_path_buf(),
            });
        }

        let hash = self
            .hasher
            .hash(path)
            .map_err(|err| IngestError::HashFailed {
                path: path.to_path_buf(),
                message: format!("{err:#}"),
            })?;

        let existing = self
            .catalog
            .get(&hash)
            .map_err(|source| IngestError::StoreFailed {
                path: path.to_path_buf(),
                source,
            })?;
        if let Some(existing) = existing {
            info!(path = %path.display(), hash = %hash.short(), "Book already in library");
            return Err(IngestError::Duplicate {
                path: path.to_path_buf(),
                hash,
                existing_title: existing.title,
            });
        }
        if seen.contains(&hash) {
            info!(path = %path.display(), hash = %hash.short(), "Book repeated within batch");
            return Err(IngestError::Duplicate {
                path: path.to_path_buf(),
                existing_title: crate::metadata::fallback_title(path),
                hash,
            });
        }

        let (metadata, quality) = match self.extractor.extract(path) {
            Ok(raw) => (BookMetadata::resolve(path, raw), MetadataQuality::Complete),
            Err(err) => {
                let reason = format!("{err:#}");
                warn!(path = %path.display(), "Metadata extraction failed, using fallbacks: {reason}");
                (BookMetadata::fallback(path), MetadataQuality::Degraded { reason })
            }
        };

        let entry = CatalogEntry {
            hash,
            title: metadata.title,
            author: metadata.author,
            cover_image: metadata.cover_image,
            source_path: path.to_path_buf(),
            added_at_unix_ms: now_unix_ms(),
            last_location: None,
        };
        self.catalog
            .put(entry.clone())
            .map_err(|source| IngestError::StoreFailed {
                path: path.to_path_buf(),
                source,
            })?;

        info!(
            path = %path.display(),
            hash = %entry.hash.short(),
            title = %entry.title,
            "Added book to library"
        );
        Ok(IngestedBook { entry, quality })
    }
}

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
