//! Terminal render surface.
//!
//! Flows chapter text into a character-cell viewport. Bookmarks have the form
//! `<chapter>:<byte offset>`; chapter hrefs (with an optional `#fragment`) are
//! accepted too so table-of-contents targets resolve.

use crate::catalog::Bookmark;
use crate::pagination::{Line, PageMetrics, join_lines, line_for_offset, wrap_lines};
use crate::render::{
    Flow, FlowConfig, LoadedDocument, RelocationSink, RenderSurface, Spread, SurfaceBinder,
    SurfaceView, Viewport,
};
use crate::theme::ThemeRules;
use anyhow::{Result, bail};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, trace};

static RE_OFFSET_BOOKMARK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+)\s*:\s*(\d+)\s*$").expect("static bookmark pattern"));

pub fn offset_bookmark(chapter: usize, offset: usize) -> Bookmark {
    Bookmark::new(format!("{chapter}:{offset}"))
}

pub fn parse_offset_bookmark(bookmark: &Bookmark) -> Option<(usize, usize)> {
    let caps = RE_OFFSET_BOOKMARK.captures(bookmark.as_str())?;
    let chapter = caps.get(1)?.as_str().parse().ok()?;
    let offset = caps.get(2)?.as_str().parse().ok()?;
    Some((chapter, offset))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Position {
    chapter: usize,
    /// Index of the first visible line within the chapter.
    line: usize,
}

pub struct TextSurface {
    document: Arc<LoadedDocument>,
    viewport: Viewport,
    flow: FlowConfig,
    font_scale_percent: u16,
    rules: Option<ThemeRules>,
    metrics: PageMetrics,
    chapters: Vec<Vec<Line>>,
    position: Position,
    /// The bookmark last displayed, reported verbatim until the reader moves.
    anchor: Option<Bookmark>,
    events: RelocationSink,
    destroyed: bool,
}

impl TextSurface {
    pub fn new(
        document: Arc<LoadedDocument>,
        viewport: Viewport,
        flow: FlowConfig,
        events: RelocationSink,
    ) -> Result<Self> {
        if document.chapters.is_empty() {
            bail!("document has no chapters to lay out");
        }
        if viewport.columns == 0 || viewport.rows == 0 {
            bail!(
                "viewport {}x{} is too small",
                viewport.columns,
                viewport.rows
            );
        }
        let mut surface = Self {
            document,
            viewport,
            flow,
            font_scale_percent: 100,
            rules: None,
            metrics: PageMetrics::new(viewport, 100),
            chapters: Vec::new(),
            position: Position {
                chapter: 0,
                line: 0,
            },
            anchor: None,
            events,
            destroyed: false,
        };
        surface.relayout();
        Ok(surface)
    }

    pub fn theme_rules(&self) -> Option<&ThemeRules> {
        self.rules.as_ref()
    }

    fn is_spread(&self) -> bool {
        self.flow.flow == Flow::Paginated && self.flow.spread == Spread::Always
    }

    fn relayout(&mut self) {
        let metrics = PageMetrics::new(self.viewport, self.font_scale_percent);
        self.metrics = if self.is_spread() {
            metrics.for_spread()
        } else {
            metrics
        };
        self.chapters = self
            .document
            .chapters
            .iter()
            .map(|chapter| wrap_lines(&chapter.text, self.metrics.chars_per_line))
            .collect();
        debug!(
            chars_per_line = self.metrics.chars_per_line,
            rows_per_page = self.metrics.rows_per_page,
            chapters = self.chapters.len(),
            "Laid out document"
        );
    }

    fn rows(&self) -> usize {
        self.metrics.rows_per_page
    }

    fn pages_per_view(&self) -> usize {
        if self.is_spread() { 2 } else { 1 }
    }

    fn lines_per_view(&self) -> usize {
        self.rows() * self.pages_per_view()
    }

    fn chapter_len(&self, chapter: usize) -> usize {
        self.chapters.get(chapter).map_or(0, Vec::len)
    }

    /// Snap a line index to the start of the view that contains it.
    fn align(&self, chapter: usize, line: usize) -> usize {
        let last = self.chapter_len(chapter).saturating_sub(1);
        let line = line.min(last);
        match self.flow.flow {
            Flow::Scrolled => line,
            Flow::Paginated => {
                let step = self.lines_per_view();
                line / step * step
            }
        }
    }

    fn offset_of(&self, position: Position) -> usize {
        self.chapters
            .get(position.chapter)
            .and_then(|lines| lines.get(position.line))
            .map_or(0, |line| line.offset)
    }

    fn resolve(&self, target: &Bookmark) -> Option<Position> {
        if let Some((chapter, offset)) = parse_offset_bookmark(target) {
            let lines = self.chapters.get(chapter)?;
            let line = line_for_offset(lines, offset);
            return Some(Position {
                chapter,
                line: self.align(chapter, line),
            });
        }
        let chapter = self.document.chapter_for_href(target.as_str())?;
        Some(Position { chapter, line: 0 })
    }

    fn move_to(&mut self, position: Position, anchor: Option<Bookmark>) {
        self.position = position;
        self.anchor = anchor;
        if let Some(location) = self.current_location() {
            trace!(location = %location, "Relocated");
            self.events.relocated(location);
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.destroyed {
            bail!("surface has been destroyed");
        }
        Ok(())
    }

    fn step(&self) -> usize {
        match self.flow.flow {
            Flow::Scrolled => self.rows().saturating_sub(1).max(1),
            Flow::Paginated => self.lines_per_view(),
        }
    }
}

impl RenderSurface for TextSurface {
    fn display(&mut self, target: Option<&Bookmark>) -> Result<()> {
        self.ensure_live()?;
        let (position, anchor) = match target {
            None => (
                Position {
                    chapter: 0,
                    line: 0,
                },
                None,
            ),
            Some(bookmark) => match self.resolve(bookmark) {
                Some(position) => {
                    // Offset bookmarks are kept verbatim; hrefs normalize to
                    // the chapter start.
                    let anchor = if parse_offset_bookmark(bookmark).is_some() {
                        bookmark.clone()
                    } else {
                        offset_bookmark(position.chapter, 0)
                    };
                    (position, Some(anchor))
                }
                None => bail!("bookmark {bookmark} does not resolve in this document"),
            },
        };
        self.move_to(position, anchor);
        Ok(())
    }

    fn next(&mut self) -> Result<()> {
        self.ensure_live()?;
        let Position { chapter, line } = self.position;
        let candidate = line + self.step();
        let next = if candidate < self.chapter_len(chapter) {
            Position {
                chapter,
                line: candidate,
            }
        } else if chapter + 1 < self.chapters.len() {
            Position {
                chapter: chapter + 1,
                line: 0,
            }
        } else {
            debug!("Already at end of document");
            return Ok(());
        };
        self.move_to(next, None);
        Ok(())
    }

    fn prev(&mut self) -> Result<()> {
        self.ensure_live()?;
        let Position { chapter, line } = self.position;
        let prev = if line > 0 {
            Position {
                chapter,
                line: line.saturating_sub(self.step()),
            }
        } else if chapter > 0 {
            let previous = chapter - 1;
            let last = self.chapter_len(previous).saturating_sub(1);
            let line = match self.flow.flow {
                Flow::Scrolled => last.saturating_sub(self.step()),
                Flow::Paginated => self.align(previous, last),
            };
            Position {
                chapter: previous,
                line,
            }
        } else {
            debug!("Already at start of document");
            return Ok(());
        };
        self.move_to(prev, None);
        Ok(())
    }

    fn current_location(&self) -> Option<Bookmark> {
        if self.destroyed {
            return None;
        }
        if let Some(anchor) = &self.anchor {
            return Some(anchor.clone());
        }
        Some(offset_bookmark(
            self.position.chapter,
            self.offset_of(self.position),
        ))
    }

    fn apply_theme(&mut self, rules: &ThemeRules) -> Result<()> {
        self.ensure_live()?;
        let relayout = rules.font_scale_percent != self.font_scale_percent;
        self.rules = Some(rules.clone());
        if !relayout {
            return Ok(());
        }
        let offset = self.offset_of(self.position);
        let chapter = self.position.chapter;
        self.font_scale_percent = rules.font_scale_percent;
        self.relayout();
        let line = match self.anchor.as_ref().and_then(parse_offset_bookmark) {
            Some((_, anchored)) => line_for_offset(&self.chapters[chapter], anchored),
            None => line_for_offset(&self.chapters[chapter], offset),
        };
        self.position = Position {
            chapter,
            line: self.align(chapter, line),
        };
        Ok(())
    }

    fn view(&self) -> SurfaceView {
        if self.destroyed {
            return SurfaceView::default();
        }
        let Position { chapter, line } = self.position;
        let lines = &self.chapters[chapter];
        let rows = self.rows();

        let pages: Vec<String> = match self.flow.flow {
            Flow::Scrolled => {
                let end = (line + rows).min(lines.len());
                vec![join_lines(&lines[line.min(end)..end])]
            }
            Flow::Paginated => (0..self.pages_per_view())
                .map(|page| {
                    let start = (line + page * rows).min(lines.len());
                    let end = (start + rows).min(lines.len());
                    join_lines(&lines[start..end])
                })
                .collect(),
        };

        let unit = match self.flow.flow {
            Flow::Scrolled => 1,
            Flow::Paginated => rows,
        };
        let units = |len: usize| len.div_ceil(unit).max(1);
        let before: usize = (0..chapter).map(|c| units(self.chapter_len(c))).sum();
        let total: usize = (0..self.chapters.len())
            .map(|c| units(self.chapter_len(c)))
            .sum();
        SurfaceView {
            pages,
            position: before + line / unit,
            total,
        }
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.chapters.clear();
        self.anchor = None;
        debug!(path = %self.document.source_path.display(), "Destroyed text surface");
    }
}

/// Binds `TextSurface`s. Every bind gets a fresh surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextSurfaceBinder;

impl SurfaceBinder for TextSurfaceBinder {
    fn bind(
        &mut self,
        document: Arc<LoadedDocument>,
        viewport: Viewport,
        flow: FlowConfig,
        events: RelocationSink,
    ) -> Result<Box<dyn RenderSurface>> {
        Ok(Box::new(TextSurface::new(document, viewport, flow, events)?))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::render::{Chapter, LayoutMode, SurfaceEvent, TocEntry};
    use crate::theme::Theme;
    use std::path::PathBuf;

    pub(crate) fn sample_document() -> Arc<LoadedDocument> {
        let paragraph = |chapter: usize| {
            (0..40)
                .map(|n| format!("Chapter {chapter} sentence number {n} flows along."))
                .collect::<Vec<_>>()
                .join(" ")
        };
        Arc::new(LoadedDocument {
            source_path: PathBuf::from("/books/foo.epub"),
            chapters: (0..3)
                .map(|c| Chapter {
                    href: format!("OEBPS/ch{c}.xhtml"),
                    text: paragraph(c),
                })
                .collect(),
            toc: (0..3)
                .map(|c| TocEntry {
                    label: format!("Chapter {c}"),
                    target: Bookmark::new(format!("OEBPS/ch{c}.xhtml")),
                    depth: 0,
                })
                .collect(),
        })
    }

    fn surface(mode: LayoutMode) -> (TextSurface, std::sync::mpsc::Receiver<SurfaceEvent>) {
        let (sink, events) = RelocationSink::channel();
        let surface = TextSurface::new(
            sample_document(),
            Viewport {
                columns: 40,
                rows: 10,
            },
            mode.flow_config(),
            sink,
        )
        .unwrap();
        (surface, events)
    }

    #[test]
    fn display_without_target_starts_at_beginning() {
        let (mut surface, events) = surface(LayoutMode::SinglePage);
        surface.display(None).unwrap();
        assert_eq!(surface.current_location(), Some(Bookmark::new("0:0")));
        assert_eq!(
            events.try_recv().unwrap(),
            SurfaceEvent::Relocated(Bookmark::new("0:0"))
        );
    }

    #[test]
    fn next_and_prev_walk_pages_and_emit_relocations() {
        let (mut surface, events) = surface(LayoutMode::SinglePage);
        surface.display(None).unwrap();
        surface.next().unwrap();
        surface.next().unwrap();
        let second = surface.current_location().unwrap();
        surface.prev().unwrap();
        surface.next().unwrap();
        assert_eq!(surface.current_location().unwrap(), second);

        let emitted: Vec<_> = events.try_iter().collect();
        assert_eq!(emitted.len(), 5);
        assert_eq!(emitted.last(), Some(&SurfaceEvent::Relocated(second)));
    }

    #[test]
    fn displayed_bookmark_is_reported_verbatim_in_every_mode() {
        let (mut single, _events) = surface(LayoutMode::SinglePage);
        single.display(None).unwrap();
        for _ in 0..3 {
            single.next().unwrap();
        }
        let location = single.current_location().unwrap();

        for mode in [LayoutMode::DoublePage, LayoutMode::Scroll] {
            let (mut other, _events) = surface(mode);
            other.display(Some(&location)).unwrap();
            assert_eq!(other.current_location(), Some(location.clone()));
        }
    }

    #[test]
    fn spread_shows_two_pages_and_steps_by_two() {
        let (mut spread, _events) = surface(LayoutMode::DoublePage);
        spread.display(None).unwrap();
        let first = spread.view();
        assert_eq!(first.pages.len(), 2);
        spread.next().unwrap();
        assert_eq!(spread.view().position, first.position + 2);
    }

    #[test]
    fn toc_href_resolves_to_chapter_start() {
        let (mut surface, _events) = surface(LayoutMode::Scroll);
        surface
            .display(Some(&Bookmark::new("OEBPS/ch2.xhtml#part")))
            .unwrap();
        assert_eq!(surface.current_location(), Some(Bookmark::new("2:0")));
        assert!(surface.display(Some(&Bookmark::new("9:0"))).is_err());
        assert!(surface.display(Some(&Bookmark::new("nowhere.xhtml"))).is_err());
    }

    #[test]
    fn next_crosses_chapter_boundary_and_stops_at_end() {
        let (mut surface, events) = surface(LayoutMode::SinglePage);
        surface.display(Some(&Bookmark::new("2:0"))).unwrap();
        let _ = events.try_iter().count();
        for _ in 0..1_000 {
            surface.next().unwrap();
        }
        let at_end = surface.current_location().unwrap();
        surface.next().unwrap();
        assert_eq!(surface.current_location().unwrap(), at_end);
        assert!(parse_offset_bookmark(&at_end).unwrap().0 == 2);

        surface.display(Some(&Bookmark::new("1:0"))).unwrap();
        surface.prev().unwrap();
        assert_eq!(parse_offset_bookmark(&surface.current_location().unwrap()).unwrap().0, 0);
    }

    #[test]
    fn theme_relayout_keeps_anchor() {
        let (mut surface, _events) = surface(LayoutMode::SinglePage);
        surface.display(Some(&Bookmark::new("1:400"))).unwrap();
        let mut theme = Theme::default();
        theme.font_scale_percent = 150;
        surface.apply_theme(&theme.rules()).unwrap();
        assert_eq!(surface.current_location(), Some(Bookmark::new("1:400")));
        assert_eq!(surface.theme_rules().unwrap().font_scale_percent, 150);
    }

    #[test]
    fn destroyed_surface_refuses_work() {
        let (mut surface, _events) = surface(LayoutMode::Scroll);
        surface.display(None).unwrap();
        surface.destroy();
        surface.destroy();
        assert!(surface.next().is_err());
        assert_eq!(surface.current_location(), None);
        assert_eq!(surface.view(), SurfaceView::default());
    }

    #[test]
    fn binder_rejects_empty_viewport() {
        let (sink, _events) = RelocationSink::channel();
        let result = TextSurfaceBinder.bind(
            sample_document(),
            Viewport {
                columns: 0,
                rows: 10,
            },
            LayoutMode::Scroll.flow_config(),
            sink,
        );
        assert!(result.is_err());
    }
}
