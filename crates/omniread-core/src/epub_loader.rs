//! EPUB loading utilities.
//!
//! Opens an EPUB, walks its spine, strips markup chapter by chapter and
//! flattens the navigation tree into table-of-contents entries.

use crate::cancellation::CancellationToken;
use crate::catalog::Bookmark;
use crate::render::{Chapter, LoadedDocument, TocEntry};
use anyhow::{Context, Result};
use epub::doc::{EpubDoc, NavPoint};
use std::path::Path;
use tracing::{debug, info, warn};

/// Load an EPUB's chapters and table of contents, checking `cancel` between
/// chapters.
pub fn load_document_with_cancel(
    path: &Path,
    cancel: Option<&CancellationToken>,
) -> Result<LoadedDocument> {
    info!(path = %path.display(), "Loading EPUB content");
    let mut doc =
        EpubDoc::new(path).with_context(|| format!("Failed to open EPUB at {}", path.display()))?;

    let total = doc.get_num_chapters();
    let mut chapters = Vec::with_capacity(total);

    for index in 0..total {
        if let Some(token) = cancel {
            token.check_cancelled("load-chapters")?;
        }
        if !doc.set_current_chapter(index) {
            continue;
        }
        let href = doc
            .get_current_path()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_else(|| format!("chapter-{index}"));
        let Some((raw, _mime)) = doc.get_current_str() else {
            continue;
        };
        // A very large width keeps html2text from baking in hard line breaks;
        // the surface wraps to its own viewport.
        let text = match html2text::from_read(raw.as_bytes(), 10_000) {
            Ok(clean) => clean,
            Err(err) => {
                warn!(chapter = index, "html2text failed: {err}");
                raw
            }
        };
        debug!(chapter = index, href = %href, chars = text.len(), "Parsed chapter");
        chapters.push(Chapter { href, text });
    }

    if chapters.iter().all(|chapter| chapter.text.trim().is_empty()) {
        anyhow::bail!("No textual content found in {}", path.display());
    }

    let mut toc = Vec::new();
    flatten_nav_points(&doc.toc, 0, &mut toc);

    info!(
        chapters = chapters.len(),
        toc_entries = toc.len(),
        "Finished loading EPUB content"
    );
    Ok(LoadedDocument {
        source_path: path.to_path_buf(),
        chapters,
        toc,
    })
}

fn flatten_nav_points(points: &[NavPoint], depth: usize, out: &mut Vec<TocEntry>) {
    for point in points {
        let label = point.label.split_whitespace().collect::<Vec<_>>().join(" ");
        out.push(TocEntry {
            label,
            target: Bookmark::new(point.content.to_string_lossy().replace('\\', "/")),
            depth,
        });
        flatten_nav_points(&point.children, depth + 1, out);
    }
}
