//! Render-surface boundary.
//!
//! A surface is a live layout of one document inside a container. The session
//! binds one per layout mode, drives navigation through it, and listens for the
//! relocation events it emits. Document bytes are acquired separately through
//! a `DocumentSource` so a rebind never re-reads the file.

use crate::cancellation::CancellationToken;
use crate::catalog::Bookmark;
use crate::theme::ThemeRules;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};

/// How the reader lays out the document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutMode {
    Scroll,
    #[default]
    SinglePage,
    DoublePage,
}

impl LayoutMode {
    pub fn flow_config(self) -> FlowConfig {
        match self {
            LayoutMode::Scroll => FlowConfig {
                flow: Flow::Scrolled,
                spread: Spread::None,
            },
            LayoutMode::SinglePage => FlowConfig {
                flow: Flow::Paginated,
                spread: Spread::None,
            },
            LayoutMode::DoublePage => FlowConfig {
                flow: Flow::Paginated,
                spread: Spread::Always,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LayoutMode::Scroll => "scroll",
            LayoutMode::SinglePage => "single-page",
            LayoutMode::DoublePage => "double-page",
        }
    }

    /// Next mode in the scroll → single → double cycle.
    pub fn cycled(self) -> Self {
        match self {
            LayoutMode::Scroll => LayoutMode::SinglePage,
            LayoutMode::SinglePage => LayoutMode::DoublePage,
            LayoutMode::DoublePage => LayoutMode::Scroll,
        }
    }
}

impl std::fmt::Display for LayoutMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LayoutMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "scroll" | "scrolled" | "continuous" => Ok(LayoutMode::Scroll),
            "single" | "single-page" | "page" | "paginated" => Ok(LayoutMode::SinglePage),
            "double" | "double-page" | "spread" => Ok(LayoutMode::DoublePage),
            other => Err(format!("unknown layout mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Scrolled,
    Paginated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spread {
    None,
    Always,
}

/// Layout-engine parameters derived from a `LayoutMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowConfig {
    pub flow: Flow,
    pub spread: Spread,
}

/// Size of the container a surface is bound into, in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub columns: u16,
    pub rows: u16,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            columns: 72,
            rows: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocEntry {
    pub label: String,
    pub target: Bookmark,
    pub depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    /// Resource path inside the package; table-of-contents targets point here.
    pub href: String,
    pub text: String,
}

/// A document acquired from disk, shared by every surface bound to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedDocument {
    pub source_path: PathBuf,
    pub chapters: Vec<Chapter>,
    pub toc: Vec<TocEntry>,
}

impl LoadedDocument {
    pub fn chapter_for_href(&self, href: &str) -> Option<usize> {
        let wanted = href.split('#').next().unwrap_or(href);
        self.chapters
            .iter()
            .position(|chapter| chapter.href == wanted)
            .or_else(|| {
                self.chapters
                    .iter()
                    .position(|chapter| chapter.href.ends_with(wanted) || wanted.ends_with(&chapter.href))
            })
    }
}

/// Document byte acquisition.
pub trait DocumentSource: Send + Sync {
    fn acquire(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Arc<LoadedDocument>>;
}

/// Acquires EPUB documents from the filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct EpubDocumentSource;

impl DocumentSource for EpubDocumentSource {
    fn acquire(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Arc<LoadedDocument>> {
        crate::epub_loader::load_document_with_cancel(path, Some(cancel)).map(Arc::new)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    Relocated(Bookmark),
}

/// Sending half of a binding's event listener. Each bind gets a fresh channel
/// so a released surface can never deliver into its successor.
#[derive(Debug, Clone)]
pub struct RelocationSink {
    sender: Sender<SurfaceEvent>,
}

impl RelocationSink {
    pub fn channel() -> (Self, Receiver<SurfaceEvent>) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, receiver)
    }

    /// Emit a relocation. A detached listener is not an error.
    pub fn relocated(&self, bookmark: Bookmark) {
        let _ = self.sender.send(SurfaceEvent::Relocated(bookmark));
    }
}

/// What a surface currently shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SurfaceView {
    /// One entry per visible page (two for a spread, one otherwise).
    pub pages: Vec<String>,
    pub position: usize,
    pub total: usize,
}

pub trait RenderSurface: Send {
    /// Show the document at `target`, or at its start when `None`.
    fn display(&mut self, target: Option<&Bookmark>) -> anyhow::Result<()>;
    fn next(&mut self) -> anyhow::Result<()>;
    fn prev(&mut self) -> anyhow::Result<()>;
    fn current_location(&self) -> Option<Bookmark>;
    fn apply_theme(&mut self, rules: &ThemeRules) -> anyhow::Result<()>;
    fn view(&self) -> SurfaceView;
    /// Release rendering resources; the surface is unusable afterwards.
    fn destroy(&mut self);
}

pub trait SurfaceBinder: Send {
    fn bind(
        &mut self,
        document: Arc<LoadedDocument>,
        viewport: Viewport,
        flow: FlowConfig,
        events: RelocationSink,
    ) -> anyhow::Result<Box<dyn RenderSurface>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_modes_map_to_flow_configs() {
        assert_eq!(
            LayoutMode::Scroll.flow_config(),
            FlowConfig {
                flow: Flow::Scrolled,
                spread: Spread::None
            }
        );
        assert_eq!(
            LayoutMode::SinglePage.flow_config(),
            FlowConfig {
                flow: Flow::Paginated,
                spread: Spread::None
            }
        );
        assert_eq!(
            LayoutMode::DoublePage.flow_config(),
            FlowConfig {
                flow: Flow::Paginated,
                spread: Spread::Always
            }
        );
    }

    #[test]
    fn layout_mode_parses_aliases() {
        assert_eq!("Scroll".parse::<LayoutMode>(), Ok(LayoutMode::Scroll));
        assert_eq!("single".parse::<LayoutMode>(), Ok(LayoutMode::SinglePage));
        assert_eq!("spread".parse::<LayoutMode>(), Ok(LayoutMode::DoublePage));
        assert!("sideways".parse::<LayoutMode>().is_err());
    }

    #[test]
    fn chapter_lookup_ignores_fragments() {
        let doc = LoadedDocument {
            source_path: PathBuf::from("/tmp/book.epub"),
            chapters: vec![
                Chapter {
                    href: "OEBPS/ch1.xhtml".to_string(),
                    text: "one".to_string(),
                },
                Chapter {
                    href: "OEBPS/ch2.xhtml".to_string(),
                    text: "two".to_string(),
                },
            ],
            toc: Vec::new(),
        };
        assert_eq!(doc.chapter_for_href("OEBPS/ch2.xhtml#sec-3"), Some(1));
        assert_eq!(doc.chapter_for_href("ch1.xhtml"), Some(0));
        assert_eq!(doc.chapter_for_href("missing.xhtml"), None);
    }

    #[test]
    fn dropped_listener_does_not_panic_sink() {
        let (sink, receiver) = RelocationSink::channel();
        drop(receiver);
        sink.relocated(Bookmark::new("0:0"));
    }
}
