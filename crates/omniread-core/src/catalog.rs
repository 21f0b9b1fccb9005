//! Persistent book catalog keyed by content hash.
//!
//! The on-disk form is a flat JSON list of entries. Readers always see a whole
//! snapshot: the in-memory list is replaced only after the new list has been
//! written and renamed into place.

use crate::error::PersistenceError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info};

pub const UNKNOWN_AUTHOR: &str = "Unknown Author";

/// Hex fingerprint of a file's bytes; the catalog's primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque pointer into document content, produced and consumed by surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bookmark(String);

impl Bookmark {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Bookmark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub hash: ContentHash,
    pub title: String,
    #[serde(default = "default_author")]
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    pub source_path: PathBuf,
    pub added_at_unix_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_location: Option<Bookmark>,
}

fn default_author() -> String {
    UNKNOWN_AUTHOR.to_string()
}

/// Catalog storage. `put` replaces an entry with the same hash; duplicate
/// rejection is the ingestion pipeline's job.
pub trait CatalogStore: Send + Sync {
    fn get(&self, hash: &ContentHash) -> Result<Option<CatalogEntry>, PersistenceError>;
    fn put(&self, entry: CatalogEntry) -> Result<(), PersistenceError>;
    fn list_all(&self) -> Result<Vec<CatalogEntry>, PersistenceError>;
    fn clear(&self) -> Result<(), PersistenceError>;

    /// Resolve a full hash or a unique prefix of one.
    fn find_by_prefix(&self, prefix: &str) -> Result<Option<CatalogEntry>, PersistenceError> {
        let prefix = prefix.trim().to_ascii_lowercase();
        if prefix.is_empty() {
            return Ok(None);
        }
        let mut matches = self
            .list_all()?
            .into_iter()
            .filter(|entry| entry.hash.as_str().starts_with(&prefix));
        let first = matches.next();
        if matches.next().is_some() {
            return Ok(None);
        }
        Ok(first)
    }
}

fn upsert(records: &mut Vec<CatalogEntry>, entry: CatalogEntry) {
    match records.iter_mut().find(|existing| existing.hash == entry.hash) {
        Some(existing) => *existing = entry,
        None => records.push(entry),
    }
}

/// Catalog persisted as `catalog.json` under the library directory.
#[derive(Debug)]
pub struct JsonCatalogStore {
    path: PathBuf,
    records: RwLock<Vec<CatalogEntry>>,
}

impl JsonCatalogStore {
    /// Open or create a catalog at `{dir}/catalog.json`.
    pub fn open(dir: &Path) -> Result<Self, PersistenceError> {
        let path = dir.join("catalog.json");
        let records = if path.exists() {
            let data = fs::read_to_string(&path).map_err(|source| PersistenceError::Io {
                path: path.clone(),
                source,
            })?;
            if data.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&data).map_err(|err| PersistenceError::Decode {
                    path: path.clone(),
                    message: err.to_string(),
                })?
            }
        } else {
            Vec::new()
        };
        info!(path = %path.display(), books = records.len(), "Opened catalog");
        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, records: &[CatalogEntry]) -> Result<(), PersistenceError> {
        let json =
            serde_json::to_string_pretty(records).map_err(|err| PersistenceError::Encode {
                what: "catalog",
                message: err.to_string(),
            })?;
        write_atomically(&self.path, json.as_bytes())?;
        debug!(path = %self.path.display(), books = records.len(), "Flushed catalog");
        Ok(())
    }

    fn read_snapshot(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<CatalogEntry>>, PersistenceError> {
        self.records.read().map_err(|_| PersistenceError::Unavailable {
            message: "catalog lock poisoned".to_string(),
        })
    }

    /// Build the next snapshot, persist it, and only then publish it.
    fn replace_with<F>(&self, update: F) -> Result<(), PersistenceError>
    where
        F: FnOnce(&mut Vec<CatalogEntry>),
    {
        let mut guard = self.records.write().map_err(|_| PersistenceError::Unavailable {
            message: "catalog lock poisoned".to_string(),
        })?;
        let mut next = guard.clone();
        update(&mut next);
        self.flush(&next)?;
        *guard = next;
        Ok(())
    }
}

impl CatalogStore for JsonCatalogStore {
    fn get(&self, hash: &ContentHash) -> Result<Option<CatalogEntry>, PersistenceError> {
        Ok(self
            .read_snapshot()?
            .iter()
            .find(|entry| &entry.hash == hash)
            .cloned())
    }

    fn put(&self, entry: CatalogEntry) -> Result<(), PersistenceError> {
        self.replace_with(|records| upsert(records, entry))
    }

    fn list_all(&self) -> Result<Vec<CatalogEntry>, PersistenceError> {
        Ok(self.read_snapshot()?.clone())
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        self.replace_with(Vec::clear)
    }
}

/// In-process catalog, used by tests and as a fallback when the library
/// directory is unavailable.
#[derive(Debug, Default)]
pub struct MemoryCatalogStore {
    records: RwLock<Vec<CatalogEntry>>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> PersistenceError {
        PersistenceError::Unavailable {
            message: "catalog lock poisoned".to_string(),
        }
    }
}

impl CatalogStore for MemoryCatalogStore {
    fn get(&self, hash: &ContentHash) -> Result<Option<CatalogEntry>, PersistenceError> {
        let records = self.records.read().map_err(|_| Self::poisoned())?;
        Ok(records.iter().find(|entry| &entry.hash == hash).cloned())
    }

    fn put(&self, entry: CatalogEntry) -> Result<(), PersistenceError> {
        let mut records = self.records.write().map_err(|_| Self::poisoned())?;
        upsert(&mut records, entry);
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<CatalogEntry>, PersistenceError> {
        Ok(self.records.read().map_err(|_| Self::poisoned())?.clone())
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        self.records.write().map_err(|_| Self::poisoned())?.clear();
        Ok(())
    }
}

/// Write `contents` to a sibling temp file and rename it over `path`, so a
/// crash never leaves a half-written file behind.
pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| PersistenceError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    fs::write(&tmp_path, contents).map_err(|source| PersistenceError::Io {
        path: tmp_path.clone(),
        source,
    })?;
    fs::rename(&tmp_path, path).map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })
}
