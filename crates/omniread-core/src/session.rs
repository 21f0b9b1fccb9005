//! Reading-session state machine.
//!
//! A session owns one catalog entry and at most one bound render surface.
//! `Loading → Ready → (Error | Closed)`; navigation and layout changes keep it
//! `Ready`. Every surface call is shielded so a misbehaving surface cannot
//! take the session down with it.

use crate::cancellation::CancellationToken;
use crate::catalog::{Bookmark, CatalogEntry, ContentHash};
use crate::error::SessionError;
use crate::persistence::SessionPersistence;
use crate::render::{
    DocumentSource, LayoutMode, LoadedDocument, RelocationSink, RenderSurface, SurfaceBinder,
    SurfaceEvent, SurfaceView, TocEntry, Viewport,
};
use crate::theme::{Theme, ThemePatch};
use serde::Serialize;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Loading,
    Ready,
    Error,
    Closed,
}

impl LifecycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Loading => "loading",
            LifecycleState::Ready => "ready",
            LifecycleState::Error => "error",
            LifecycleState::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavDirection {
    Next,
    Prev,
}

/// A bound surface together with the listener for its relocation events.
/// Released exactly once, on close, cancellation, error or rebind.
struct SurfaceBinding {
    surface: Box<dyn RenderSurface>,
    events: Receiver<SurfaceEvent>,
}

impl SurfaceBinding {
    fn release(mut self) {
        if let Err(err) = shielded(|| {
            self.surface.destroy();
            Ok(())
        }) {
            warn!("Surface destroy failed: {err:#}");
        }
    }

    /// Pending relocations in emission order, last one wins.
    fn drain(&self) -> Option<Bookmark> {
        self.events
            .try_iter()
            .map(|SurfaceEvent::Relocated(bookmark)| bookmark)
            .last()
    }
}

/// Run a surface callback, converting a panic into an error.
fn shielded<T>(call: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(anyhow::anyhow!("surface panicked: {message}"))
        }
    }
}

/// Observable session state, returned with every command.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub hash: ContentHash,
    pub title: String,
    pub author: String,
    pub state: LifecycleState,
    pub layout_mode: LayoutMode,
    pub location: Option<Bookmark>,
    pub theme: Theme,
    pub view: SurfaceView,
    pub table_of_contents: Vec<TocEntry>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub enum SessionCommand {
    GetSnapshot,
    Navigate(NavDirection),
    JumpTo { bookmark: Bookmark },
    JumpToToc { index: usize },
    ChangeLayoutMode { mode: LayoutMode },
    ApplyTheme { patch: ThemePatch },
    Close,
}

impl SessionCommand {
    pub fn action(&self) -> &'static str {
        match self {
            Self::GetSnapshot => "session_get_snapshot",
            Self::Navigate(NavDirection::Next) => "session_next",
            Self::Navigate(NavDirection::Prev) => "session_prev",
            Self::JumpTo { .. } => "session_jump_to",
            Self::JumpToToc { .. } => "session_jump_to_toc",
            Self::ChangeLayoutMode { .. } => "session_change_layout_mode",
            Self::ApplyTheme { .. } => "session_apply_theme",
            Self::Close => "session_close",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub action: &'static str,
    pub snapshot: SessionSnapshot,
}

pub struct ReadingSession {
    entry: CatalogEntry,
    layout_mode: LayoutMode,
    viewport: Viewport,
    theme: Theme,
    state: LifecycleState,
    error: Option<String>,
    current_location: Option<Bookmark>,
    table_of_contents: Vec<TocEntry>,
    document: Option<Arc<LoadedDocument>>,
    binder: Box<dyn SurfaceBinder>,
    binding: Option<SurfaceBinding>,
}

impl ReadingSession {
    pub fn new(
        entry: CatalogEntry,
        layout_mode: LayoutMode,
        viewport: Viewport,
        theme: Theme,
        binder: Box<dyn SurfaceBinder>,
    ) -> Self {
        Self {
            entry,
            layout_mode,
            viewport,
            theme,
            state: LifecycleState::Loading,
            error: None,
            current_location: None,
            table_of_contents: Vec::new(),
            document: None,
            binder,
            binding: None,
        }
    }

    pub fn entry(&self) -> &CatalogEntry {
        &self.entry
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn layout_mode(&self) -> LayoutMode {
        self.layout_mode
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    pub fn current_location(&self) -> Option<&Bookmark> {
        self.current_location.as_ref()
    }

    pub fn table_of_contents(&self) -> &[TocEntry] {
        &self.table_of_contents
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Acquire the document, bind a surface and show the last location.
    ///
    /// A cancelled open releases whatever was bound and ends `Closed`; any
    /// other failure ends `Error`. Neither touches `entry.last_location`.
    pub fn open(
        &mut self,
        source: &dyn DocumentSource,
        cancel: &CancellationToken,
    ) -> Result<(), SessionError> {
        if self.state != LifecycleState::Loading {
            return Err(SessionError::NotReady {
                state: self.state.as_str(),
            });
        }
        info!(
            hash = %self.entry.hash.short(),
            path = %self.entry.source_path.display(),
            mode = %self.layout_mode,
            "Opening reading session"
        );
        match self.open_stages(source, cancel) {
            Ok(()) => {
                self.state = LifecycleState::Ready;
                info!(
                    hash = %self.entry.hash.short(),
                    location = ?self.current_location.as_ref().map(Bookmark::as_str),
                    toc_entries = self.table_of_contents.len(),
                    "Reading session ready"
                );
                Ok(())
            }
            Err(SessionError::Cancelled { stage }) => {
                info!(hash = %self.entry.hash.short(), stage, "Open cancelled");
                self.release_binding();
                self.state = LifecycleState::Closed;
                Err(SessionError::Cancelled { stage })
            }
            Err(err) => {
                warn!(hash = %self.entry.hash.short(), "Open failed: {err}");
                self.release_binding();
                self.error = Some(err.to_string());
                self.state = LifecycleState::Error;
                Err(err)
            }
        }
    }

    fn open_stages(
        &mut self,
        source: &dyn DocumentSource,
        cancel: &CancellationToken,
    ) -> Result<(), SessionError> {
        cancel.check_cancelled("acquire")?;
        let path = self.entry.source_path.clone();
        let document = shielded(|| source.acquire(&path, cancel)).map_err(|err| {
            if cancel.is_cancelled() {
                SessionError::Cancelled { stage: "acquire" }
            } else {
                SessionError::LoadFailed {
                    reason: format!("{err:#}"),
                }
            }
        })?;

        cancel.check_cancelled("bind")?;
        let target = self.entry.last_location.clone();
        let (binding, location) = self
            .bind_and_show(document.clone(), self.layout_mode, target.as_ref())
            .map_err(|err| SessionError::LoadFailed {
                reason: format!("{err:#}"),
            })?;
        self.binding = Some(binding);

        cancel.check_cancelled("display")?;
        self.table_of_contents = document.toc.clone();
        self.document = Some(document);
        self.current_location = location;
        Ok(())
    }

    /// Bind a surface for `mode`, push the theme and display `target`,
    /// falling back to the document start when `target` no longer resolves.
    fn bind_and_show(
        &mut self,
        document: Arc<LoadedDocument>,
        mode: LayoutMode,
        target: Option<&Bookmark>,
    ) -> anyhow::Result<(SurfaceBinding, Option<Bookmark>)> {
        let (sink, events) = RelocationSink::channel();
        let viewport = self.viewport;
        let binder = &mut self.binder;
        let surface = shielded(|| binder.bind(document, viewport, mode.flow_config(), sink))?;
        let mut binding = SurfaceBinding { surface, events };

        let rules = self.theme.rules();
        let shown = shielded(|| {
            binding.surface.apply_theme(&rules)?;
            if let Some(target) = target {
                match binding.surface.display(Some(target)) {
                    Ok(()) => return Ok(()),
                    Err(err) => {
                        warn!(location = %target, "Stored location no longer resolves, starting at beginning: {err:#}")
                    }
                }
            }
            binding.surface.display(None)
        });
        if let Err(err) = shown {
            binding.release();
            return Err(err);
        }
        let location = binding
            .drain()
            .or_else(|| binding.surface.current_location());
        Ok((binding, location))
    }

    fn release_binding(&mut self) {
        if let Some(binding) = self.binding.take() {
            binding.release();
        }
    }

    fn ensure_ready(&self) -> Result<(), SessionError> {
        if self.state != LifecycleState::Ready {
            return Err(SessionError::NotReady {
                state: self.state.as_str(),
            });
        }
        Ok(())
    }

    /// Switch layout, preserving the position read from the live surface.
    /// When that position differs from the last recorded one it is recorded
    /// and persisted like any other relocation.
    pub fn change_layout_mode(
        &mut self,
        mode: LayoutMode,
        persistence: &mut SessionPersistence,
    ) -> Result<(), SessionError> {
        self.ensure_ready()?;
        if mode == self.layout_mode {
            return Ok(());
        }
        let Some(document) = self.document.clone() else {
            return Err(SessionError::NotReady {
                state: self.state.as_str(),
            });
        };

        let captured = self
            .binding
            .as_ref()
            .and_then(|binding| shielded(|| Ok(binding.surface.current_location())).ok().flatten())
            .or_else(|| self.current_location.clone());
        let previous = self.layout_mode;
        self.release_binding();

        match self.bind_and_show(document.clone(), mode, captured.as_ref()) {
            Ok((binding, _)) => {
                self.binding = Some(binding);
                self.layout_mode = mode;
                self.adopt_location(captured, persistence);
                info!(from = %previous, to = %mode, "Changed layout mode");
                Ok(())
            }
            Err(err) => {
                let reason = format!("{err:#}");
                warn!(mode = %mode, "Layout bind failed, restoring {previous}: {reason}");
                match self.bind_and_show(document, previous, captured.as_ref()) {
                    Ok((binding, _)) => {
                        self.binding = Some(binding);
                        self.adopt_location(captured, persistence);
                    }
                    Err(restore_err) => {
                        let message = format!("{restore_err:#}");
                        warn!(mode = %previous, "Restoring previous layout failed: {message}");
                        self.error = Some(message);
                        self.state = LifecycleState::Error;
                    }
                }
                Err(SessionError::SurfaceBindFailed { mode, reason })
            }
        }
    }

    pub fn navigate(
        &mut self,
        direction: NavDirection,
        persistence: &mut SessionPersistence,
    ) -> Result<Option<Bookmark>, SessionError> {
        self.ensure_ready()?;
        self.with_surface("navigate", |surface| match direction {
            NavDirection::Next => surface.next(),
            NavDirection::Prev => surface.prev(),
        });
        self.record_relocations(persistence);
        Ok(self.current_location.clone())
    }

    pub fn jump_to(
        &mut self,
        bookmark: &Bookmark,
        persistence: &mut SessionPersistence,
    ) -> Result<Option<Bookmark>, SessionError> {
        self.ensure_ready()?;
        self.with_surface("jump", |surface| surface.display(Some(bookmark)));
        self.record_relocations(persistence);
        Ok(self.current_location.clone())
    }

    pub fn jump_to_toc(
        &mut self,
        index: usize,
        persistence: &mut SessionPersistence,
    ) -> Result<Option<Bookmark>, SessionError> {
        self.ensure_ready()?;
        let Some(entry) = self.table_of_contents.get(index) else {
            warn!(index, entries = self.table_of_contents.len(), "No such table-of-contents entry");
            return Ok(self.current_location.clone());
        };
        let target = entry.target.clone();
        self.jump_to(&target, persistence)
    }

    /// Merge `patch` and push the resulting rules to the bound surface without
    /// rebinding. Returns whether the theme changed.
    pub fn apply_theme(&mut self, patch: ThemePatch, persistence: &mut SessionPersistence) -> bool {
        if !self.theme.merge(patch) {
            return false;
        }
        let rules = self.theme.rules();
        self.with_surface("apply-theme", |surface| surface.apply_theme(&rules));
        persistence.save_theme(&self.theme);
        true
    }

    /// Adopt a theme changed elsewhere without persisting it again.
    pub fn sync_theme(&mut self, theme: &Theme) {
        if &self.theme == theme {
            return;
        }
        self.theme = theme.clone();
        let rules = self.theme.rules();
        self.with_surface("apply-theme", |surface| surface.apply_theme(&rules));
    }

    /// Release the surface and listeners. Safe from any state.
    pub fn close(&mut self) {
        if self.state == LifecycleState::Closed {
            return;
        }
        self.release_binding();
        self.document = None;
        self.state = LifecycleState::Closed;
        info!(hash = %self.entry.hash.short(), "Closed reading session");
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let view = self
            .binding
            .as_ref()
            .and_then(|binding| shielded(|| Ok(binding.surface.view())).ok())
            .unwrap_or_default();
        SessionSnapshot {
            hash: self.entry.hash.clone(),
            title: self.entry.title.clone(),
            author: self.entry.author.clone(),
            state: self.state,
            layout_mode: self.layout_mode,
            location: self.current_location.clone(),
            theme: self.theme.clone(),
            view,
            table_of_contents: self.table_of_contents.clone(),
            error: self.error.clone(),
        }
    }

    pub fn apply_command(
        &mut self,
        command: SessionCommand,
        persistence: &mut SessionPersistence,
    ) -> Result<SessionEvent, SessionError> {
        let action = command.action();
        match command {
            SessionCommand::GetSnapshot => {}
            SessionCommand::Navigate(direction) => {
                self.navigate(direction, persistence)?;
            }
            SessionCommand::JumpTo { bookmark } => {
                self.jump_to(&bookmark, persistence)?;
            }
            SessionCommand::JumpToToc { index } => {
                self.jump_to_toc(index, persistence)?;
            }
            SessionCommand::ChangeLayoutMode { mode } => {
                self.change_layout_mode(mode, persistence)?;
                persistence.save_layout_mode(mode);
            }
            SessionCommand::ApplyTheme { patch } => {
                self.apply_theme(patch, persistence);
            }
            SessionCommand::Close => self.close(),
        }
        Ok(SessionEvent {
            action,
            snapshot: self.snapshot(),
        })
    }

    /// Run a surface callback while `Ready`; failures are logged and ignored.
    fn with_surface<F>(&mut self, what: &'static str, call: F)
    where
        F: FnOnce(&mut dyn RenderSurface) -> anyhow::Result<()>,
    {
        let Some(binding) = self.binding.as_mut() else {
            return;
        };
        let surface = binding.surface.as_mut();
        if let Err(err) = shielded(|| call(surface)) {
            warn!(operation = what, "Surface call failed: {err:#}");
        }
    }

    fn record_relocations(&mut self, persistence: &mut SessionPersistence) {
        let latest = self.binding.as_ref().and_then(SurfaceBinding::drain);
        self.adopt_location(latest, persistence);
    }

    fn adopt_location(&mut self, location: Option<Bookmark>, persistence: &mut SessionPersistence) {
        let Some(latest) = location else {
            return;
        };
        if self.current_location.as_ref() == Some(&latest) {
            return;
        }
        debug!(hash = %self.entry.hash.short(), location = %latest, "Relocated");
        self.current_location = Some(latest.clone());
        self.entry.last_location = Some(latest.clone());
        persistence.save_location(&self.entry.hash, &latest);
    }
}

impl Drop for ReadingSession {
    fn drop(&mut self) {
        self.release_binding();
    }
}
