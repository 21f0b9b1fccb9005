//! Typed errors for the ingestion, session and persistence boundaries.

use crate::catalog::ContentHash;
use crate::render::LayoutMode;
use std::path::PathBuf;
use thiserror::Error;

/// Per-path ingestion failures. None of these abort a batch.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Not an EPUB; batch ingestion skips these without reporting them.
    #[error("unsupported file type: {}", path.display())]
    UnsupportedExtension { path: PathBuf },

    #[error("failed to hash {}: {message}", path.display())]
    HashFailed { path: PathBuf, message: String },

    /// Informational: the book is already cataloged under `hash`.
    #[error("{} is already in the library as \"{existing_title}\" ({hash})", path.display())]
    Duplicate {
        path: PathBuf,
        hash: ContentHash,
        existing_title: String,
    },

    #[error("failed to save catalog entry for {}: {source}", path.display())]
    StoreFailed {
        path: PathBuf,
        #[source]
        source: PersistenceError,
    },
}

impl IngestError {
    /// Whether the failure should be shown as informational rather than an error.
    pub fn is_informational(&self) -> bool {
        matches!(
            self,
            IngestError::Duplicate { .. } | IngestError::UnsupportedExtension { .. }
        )
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Document unreadable or corrupt; terminal for the session.
    #[error("failed to load book: {reason}")]
    LoadFailed { reason: String },

    #[error("failed to bind {mode} layout: {reason}")]
    SurfaceBindFailed { mode: LayoutMode, reason: String },

    #[error("session is {state}, expected ready")]
    NotReady { state: &'static str },

    #[error("open cancelled at stage={stage}")]
    Cancelled { stage: &'static str },
}

/// Storage backend failures. Session persistence absorbs these; catalog
/// writes surface them through `IngestError::StoreFailed`.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode {what}: {message}")]
    Encode { what: &'static str, message: String },

    #[error("failed to decode {}: {message}", path.display())]
    Decode { path: PathBuf, message: String },

    #[error("store unavailable: {message}")]
    Unavailable { message: String },
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("{0} is already in progress")]
    OperationConflict(&'static str),

    #[error("no book with hash {hash}")]
    UnknownBook { hash: String },

    #[error("no reading session is open")]
    NoSession,

    #[error("host state lock poisoned")]
    LockPoisoned,

    #[error("background task failed: {0}")]
    TaskFailed(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
