//! Ingestion and reading-session engine for the OmniRead e-book library.
//!
//! The crate is split along the seams of the reader:
//! - `ingest` turns candidate paths into deduplicated `catalog` entries.
//! - `session` owns one open book bound to a `render` surface.
//! - `persistence` carries theme and last-location settings across restarts.
//! - `host` ties the pieces together behind one lock for a front end.

pub mod cancellation;
pub mod catalog;
pub mod config;
pub mod epub_loader;
pub mod error;
pub mod hashing;
pub mod host;
pub mod ingest;
pub mod input;
pub mod metadata;
pub mod pagination;
pub mod persistence;
pub mod render;
pub mod session;
pub mod settings;
pub mod text_surface;
pub mod theme;

pub use catalog::{Bookmark, CatalogEntry, CatalogStore, ContentHash};
pub use error::{HostError, IngestError, PersistenceError, SessionError};
pub use render::LayoutMode;
pub use theme::{ColorScheme, Theme, ThemePatch};
