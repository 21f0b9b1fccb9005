//! Reader host: owns the stores, the ingestion pipeline and the active session.
//!
//! Front ends hold the host behind a `std::sync::Mutex`. Blocking work runs on
//! the tokio blocking pool with the lock released; every continuation
//! re-locks and checks its request id before touching state, so a superseded
//! open can never install its session.

use crate::cancellation::OpenLease;
use crate::catalog::{Bookmark, CatalogEntry, CatalogStore, ContentHash, JsonCatalogStore};
use crate::config::AppConfig;
use crate::error::{HostError, SessionError};
use crate::hashing::{ContentHasher, hasher_for};
use crate::ingest::{IngestProgress, IngestReport, IngestionPipeline};
use crate::input::{InputRouter, InputScope, KeyAction, KeyPress};
use crate::metadata::{EpubMetadataExtractor, MetadataExtractor};
use crate::persistence::SessionPersistence;
use crate::render::{DocumentSource, EpubDocumentSource, LayoutMode, SurfaceBinder};
use crate::session::{NavDirection, ReadingSession, SessionSnapshot};
use crate::settings::{SettingsStore, TomlSettingsStore};
use crate::text_surface::TextSurfaceBinder;
use crate::theme::{Theme, ThemePatch};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::broadcast;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 64;

pub type BinderFactory = Arc<dyn Fn() -> Box<dyn SurfaceBinder> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenPhase {
    Started,
    Ready,
    Failed,
    Cancelled,
}

/// Observability events; nothing in the host depends on them being received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum HostEvent {
    SourceOpen {
        request_id: u64,
        hash: ContentHash,
        phase: OpenPhase,
        message: Option<String>,
    },
    BookAdded {
        hash: ContentHash,
        title: String,
    },
    Relocated {
        hash: ContentHash,
        location: Bookmark,
    },
    ThemeChanged {
        theme: Theme,
    },
    LayoutModeChanged {
        mode: LayoutMode,
    },
    SessionClosed {
        hash: ContentHash,
    },
}

impl HostEvent {
    pub fn name(&self) -> &'static str {
        match self {
            HostEvent::SourceOpen { .. } => "source-open",
            HostEvent::BookAdded { .. } => "book-added",
            HostEvent::Relocated { .. } => "relocated",
            HostEvent::ThemeChanged { .. } => "theme-changed",
            HostEvent::LayoutModeChanged { .. } => "layout-mode-changed",
            HostEvent::SessionClosed { .. } => "session-closed",
        }
    }
}

/// Reader chrome state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PanelState {
    pub show_toc: bool,
}

/// Injected collaborators.
pub struct HostServices {
    pub catalog: Arc<dyn CatalogStore>,
    pub settings: Box<dyn SettingsStore>,
    pub hasher: Arc<dyn ContentHasher>,
    pub extractor: Arc<dyn MetadataExtractor>,
    pub source: Arc<dyn DocumentSource>,
    pub binder_factory: BinderFactory,
}

pub struct ReaderHost {
    config: AppConfig,
    catalog: Arc<dyn CatalogStore>,
    persistence: SessionPersistence,
    pipeline: Arc<IngestionPipeline>,
    source: Arc<dyn DocumentSource>,
    binder_factory: BinderFactory,
    theme: Theme,
    layout_mode: LayoutMode,
    session: Option<ReadingSession>,
    open: Option<OpenLease>,
    next_request_id: u64,
    ingest_in_flight: bool,
    panels: PanelState,
    input: InputRouter,
    events: broadcast::Sender<HostEvent>,
}

impl ReaderHost {
    pub fn new(config: AppConfig, services: HostServices) -> Self {
        let persistence = SessionPersistence::new(services.settings);
        let theme = persistence.load_defaults(&config.default_theme());
        let layout_mode = persistence
            .load_layout_mode()
            .unwrap_or(config.layout_mode);
        let pipeline = Arc::new(IngestionPipeline::new(
            services.hasher,
            services.extractor,
            services.catalog.clone(),
        ));
        let input = InputRouter::new(config.keymap(), config.input_debounce());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        info!(
            color_scheme = %theme.color_scheme,
            font_scale = theme.font_scale_percent,
            layout = %layout_mode,
            "Reader host ready"
        );
        Self {
            config,
            catalog: services.catalog,
            persistence,
            pipeline,
            source: services.source,
            binder_factory: services.binder_factory,
            theme,
            layout_mode,
            session: None,
            open: None,
            next_request_id: 1,
            ingest_in_flight: false,
            panels: PanelState::default(),
            input,
            events,
        }
    }

    /// Host backed by the on-disk catalog and settings under `config.data_dir`.
    pub fn from_config(config: AppConfig) -> Result<Self, HostError> {
        let dir = config.data_dir();
        let catalog = Arc::new(JsonCatalogStore::open(&dir)?);
        let settings = Box::new(TomlSettingsStore::open(&dir));
        let hasher = hasher_for(config.hash_strategy, config.hash_sample_bytes);
        let services = HostServices {
            catalog,
            settings,
            hasher,
            extractor: Arc::new(EpubMetadataExtractor),
            source: Arc::new(EpubDocumentSource),
            binder_factory: Arc::new(|| Box::new(TextSurfaceBinder) as Box<dyn SurfaceBinder>),
        };
        Ok(Self::new(config, services))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    pub fn layout_mode(&self) -> LayoutMode {
        self.layout_mode
    }

    pub fn panels(&self) -> PanelState {
        self.panels
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }

    /// Request id of the open currently in flight, if any.
    pub fn open_in_flight(&self) -> Option<u64> {
        self.open.as_ref().map(|lease| lease.request_id)
    }

    fn emit(&self, event: HostEvent) {
        debug!(event = event.name(), "Host event");
        let _ = self.events.send(event);
    }

    pub fn list_books(&self) -> Result<Vec<CatalogEntry>, HostError> {
        let mut books = self.catalog.list_all()?;
        books.sort_by_key(|entry| entry.added_at_unix_ms);
        Ok(books)
    }

    /// Close any session and drop every catalog entry and remembered location.
    pub fn clear_library(&mut self) -> Result<usize, HostError> {
        self.close_session();
        let books = self.catalog.list_all()?;
        self.catalog.clear()?;
        for entry in &books {
            self.persistence.forget_location(&entry.hash);
        }
        info!(removed = books.len(), "Cleared library");
        Ok(books.len())
    }

    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.session.as_ref().map(ReadingSession::snapshot)
    }

    fn session_mut(&mut self) -> Result<&mut ReadingSession, HostError> {
        self.session.as_mut().ok_or(HostError::NoSession)
    }

    fn begin_open(
        &mut self,
        hash_prefix: &str,
    ) -> Result<(OpenLease, ReadingSession, Arc<dyn DocumentSource>), HostError> {
        let mut entry =
            self.catalog
                .find_by_prefix(hash_prefix)?
                .ok_or_else(|| HostError::UnknownBook {
                    hash: hash_prefix.to_string(),
                })?;

        self.close_session();

        let request_id = self.next_request_id;
        self.next_request_id += 1;
        let lease = OpenLease::new(request_id, entry.hash.clone());
        self.open = Some(lease.clone());

        if let Some(saved) = self.persistence.load_location(&entry.hash) {
            entry.last_location = Some(saved);
        }
        let session = ReadingSession::new(
            entry,
            self.layout_mode,
            self.config.viewport(),
            self.theme.clone(),
            (self.binder_factory)(),
        );
        self.emit(HostEvent::SourceOpen {
            request_id,
            hash: session.entry().hash.clone(),
            phase: OpenPhase::Started,
            message: None,
        });
        info!(request_id, hash = %session.entry().hash.short(), "Open requested");
        Ok((lease, session, self.source.clone()))
    }

    fn finish_open(
        &mut self,
        lease: OpenLease,
        outcome: Result<(ReadingSession, Result<(), SessionError>), JoinError>,
    ) -> Result<SessionSnapshot, HostError> {
        let current = lease.is_current(self.open_in_flight());
        let (mut session, result) = match outcome {
            Ok(done) => done,
            Err(err) => {
                warn!(request_id = lease.request_id, "Open task failed: {err}");
                if !current {
                    return Err(SessionError::Cancelled { stage: "superseded" }.into());
                }
                self.open = None;
                let reason = format!("load task failed: {err}");
                self.emit(HostEvent::SourceOpen {
                    request_id: lease.request_id,
                    hash: lease.hash.clone(),
                    phase: OpenPhase::Failed,
                    message: Some(reason.clone()),
                });
                return Err(SessionError::LoadFailed { reason }.into());
            }
        };
        let hash = session.entry().hash.clone();

        if !current {
            info!(request_id = lease.request_id, "Discarding stale open");
            session.close();
            return Err(SessionError::Cancelled { stage: "superseded" }.into());
        }
        self.open = None;

        match result {
            Ok(()) => {
                let snapshot = session.snapshot();
                self.session = Some(session);
                self.emit(HostEvent::SourceOpen {
                    request_id: lease.request_id,
                    hash,
                    phase: OpenPhase::Ready,
                    message: None,
                });
                Ok(snapshot)
            }
            Err(err) => {
                session.close();
                let phase = if matches!(err, SessionError::Cancelled { .. }) {
                    OpenPhase::Cancelled
                } else {
                    OpenPhase::Failed
                };
                self.emit(HostEvent::SourceOpen {
                    request_id: lease.request_id,
                    hash,
                    phase,
                    message: Some(err.to_string()),
                });
                Err(err.into())
            }
        }
    }

    /// Abort the open in flight, if any.
    pub fn cancel_open(&mut self) -> bool {
        let Some(lease) = self.open.take() else {
            return false;
        };
        lease.token.cancel();
        info!(request_id = lease.request_id, hash = %lease.hash.short(), "Cancelled open");
        self.emit(HostEvent::SourceOpen {
            request_id: lease.request_id,
            hash: lease.hash,
            phase: OpenPhase::Cancelled,
            message: None,
        });
        true
    }

    /// Cancel any open still loading, then close the active session, writing
    /// its location back to the catalog.
    pub fn close_session(&mut self) -> bool {
        let cancelled = self.cancel_open();
        let Some(mut session) = self.session.take() else {
            return cancelled;
        };
        let hash = session.entry().hash.clone();
        let location = session.current_location().cloned();
        session.close();
        self.panels.show_toc = false;

        if let Some(location) = location {
            match self.catalog.get(&hash) {
                Ok(Some(mut stored)) if stored.last_location.as_ref() != Some(&location) => {
                    stored.last_location = Some(location);
                    if let Err(err) = self.catalog.put(stored) {
                        warn!(hash = %hash.short(), "Failed to write last location to catalog: {err}");
                    }
                }
                Ok(_) => {}
                Err(err) => warn!(hash = %hash.short(), "Failed to read catalog entry: {err}"),
            }
        }
        self.persistence.flush();
        self.emit(HostEvent::SessionClosed { hash });
        true
    }

    fn after_move(&mut self, before: Option<Bookmark>) -> Result<SessionSnapshot, HostError> {
        let session = self.session_mut()?;
        let snapshot = session.snapshot();
        if snapshot.location != before {
            if let Some(location) = snapshot.location.clone() {
                self.emit(HostEvent::Relocated {
                    hash: snapshot.hash.clone(),
                    location,
                });
            }
        }
        Ok(snapshot)
    }

    pub fn navigate(&mut self, direction: NavDirection) -> Result<SessionSnapshot, HostError> {
        let session = self.session.as_mut().ok_or(HostError::NoSession)?;
        let before = session.current_location().cloned();
        session.navigate(direction, &mut self.persistence)?;
        self.after_move(before)
    }

    pub fn jump_to(&mut self, bookmark: &Bookmark) -> Result<SessionSnapshot, HostError> {
        let session = self.session.as_mut().ok_or(HostError::NoSession)?;
        let before = session.current_location().cloned();
        session.jump_to(bookmark, &mut self.persistence)?;
        self.after_move(before)
    }

    /// Jump to a table-of-contents entry and close the contents panel.
    pub fn jump_to_toc(&mut self, index: usize) -> Result<SessionSnapshot, HostError> {
        let session = self.session.as_mut().ok_or(HostError::NoSession)?;
        let before = session.current_location().cloned();
        session.jump_to_toc(index, &mut self.persistence)?;
        self.panels.show_toc = false;
        self.after_move(before)
    }

    pub fn toggle_toc(&mut self) -> bool {
        self.panels.show_toc = !self.panels.show_toc;
        self.panels.show_toc
    }

    /// Change the layout mode; with no session open only the preference changes.
    pub fn change_layout_mode(&mut self, mode: LayoutMode) -> Result<LayoutMode, HostError> {
        let relocated = match self.session.as_mut() {
            Some(session) => {
                let before = session.current_location().cloned();
                session.change_layout_mode(mode, &mut self.persistence)?;
                let after = session.current_location().cloned();
                match after {
                    Some(location) if Some(&location) != before.as_ref() => {
                        Some((session.entry().hash.clone(), location))
                    }
                    _ => None,
                }
            }
            None => None,
        };
        if let Some((hash, location)) = relocated {
            self.emit(HostEvent::Relocated { hash, location });
        }
        if self.layout_mode != mode {
            self.layout_mode = mode;
            self.persistence.save_layout_mode(mode);
            self.emit(HostEvent::LayoutModeChanged { mode });
        }
        Ok(mode)
    }

    /// Merge a theme patch globally and push it to the open session.
    pub fn apply_theme(&mut self, patch: ThemePatch) -> Theme {
        if self.theme.merge(patch) {
            self.persistence.save_theme(&self.theme);
            if let Some(session) = self.session.as_mut() {
                session.sync_theme(&self.theme);
            }
            self.emit(HostEvent::ThemeChanged {
                theme: self.theme.clone(),
            });
        }
        self.theme.clone()
    }

    pub fn set_input_focus(&mut self, scope: InputScope) {
        self.input.set_focus(scope);
    }

    /// Route a key press and run the action it maps to. Returns the action
    /// dispatched, or `None` for unbound keys and cross-scope echoes.
    pub fn handle_key(
        &mut self,
        scope: InputScope,
        press: &KeyPress,
        at: Instant,
    ) -> Result<Option<KeyAction>, HostError> {
        let Some(action) = self.input.route(scope, press, at) else {
            return Ok(None);
        };
        match action {
            KeyAction::NextPage => {
                self.navigate(NavDirection::Next)?;
            }
            KeyAction::PrevPage => {
                self.navigate(NavDirection::Prev)?;
            }
            KeyAction::ToggleToc => {
                self.toggle_toc();
            }
            KeyAction::CycleLayout => {
                self.change_layout_mode(self.layout_mode.cycled())?;
            }
            KeyAction::Close => {
                self.close_session();
            }
        }
        Ok(Some(action))
    }

    /// Cancel pending work, close the session and flush pending settings.
    pub fn shutdown(&mut self) {
        self.cancel_open();
        self.close_session();
        self.persistence.flush();
        let pending = self.persistence.pending_writes();
        if pending > 0 {
            warn!(pending, "Shutting down with unsaved settings");
        } else {
            info!("Reader host shut down");
        }
    }
}

fn lock(host: &Mutex<ReaderHost>) -> Result<MutexGuard<'_, ReaderHost>, HostError> {
    host.lock().map_err(|_| HostError::LockPoisoned)
}

/// Ingest a batch of paths on the blocking pool. One batch at a time.
pub async fn ingest_paths(
    host: &Mutex<ReaderHost>,
    paths: Vec<PathBuf>,
) -> Result<IngestReport, HostError> {
    let (pipeline, events) = {
        let mut guard = lock(host)?;
        if guard.ingest_in_flight {
            return Err(HostError::OperationConflict("ingestion"));
        }
        guard.ingest_in_flight = true;
        (guard.pipeline.clone(), guard.events.clone())
    };

    let task = tokio::task::spawn_blocking(move || {
        pipeline.ingest_batch(&paths, |progress| {
            if let IngestProgress::Added { hash, title, .. } = progress {
                let _ = events.send(HostEvent::BookAdded { hash, title });
            }
        })
    })
    .await;

    lock(host)?.ingest_in_flight = false;
    task.map_err(|err| HostError::TaskFailed(err.to_string()))
}

/// Open the book whose hash starts with `hash_prefix`, superseding any open
/// already in flight.
pub async fn open_book(
    host: &Mutex<ReaderHost>,
    hash_prefix: &str,
) -> Result<SessionSnapshot, HostError> {
    let (lease, mut session, source) = lock(host)?.begin_open(hash_prefix)?;

    let token = lease.token.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let result = session.open(source.as_ref(), &token);
        (session, result)
    })
    .await;

    lock(host)?.finish_open(lease, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use crate::catalog::MemoryCatalogStore;
    use crate::hashing::FullDigestHasher;
    use crate::metadata::RawMetadata;
    use crate::render::LoadedDocument;
    use crate::settings::MemorySettingsStore;
    use crate::text_surface::tests::sample_document;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// Serves the sample document; paths containing "slow" block until the
    /// gate opens, ignoring cancellation.
    struct GatedSource {
        gate_open: Arc<AtomicBool>,
    }

    impl DocumentSource for GatedSource {
        fn acquire(
            &self,
            path: &Path,
            _cancel: &CancellationToken,
        ) -> anyhow::Result<Arc<LoadedDocument>> {
            if path.to_string_lossy().contains("slow") {
                let deadline = Instant::now() + Duration::from_secs(5);
                while !self.gate_open.load(Ordering::SeqCst) && Instant::now() < deadline {
                    std::thread::sleep(Duration::from_millis(2));
                }
            }
            if path.to_string_lossy().contains("corrupt") {
                anyhow::bail!("zip archive is truncated");
            }
            Ok(sample_document())
        }
    }

    struct TitleOnly;

    impl MetadataExtractor for TitleOnly {
        fn extract(&self, path: &Path) -> anyhow::Result<RawMetadata> {
            Ok(RawMetadata {
                title: path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned()),
                author: None,
                cover_image: None,
            })
        }
    }

    fn entry(hash: &str, path: &str) -> CatalogEntry {
        CatalogEntry {
            hash: ContentHash::new(hash),
            title: path.to_string(),
            author: "Bar".to_string(),
            cover_image: None,
            source_path: PathBuf::from(path),
            added_at_unix_ms: 1,
            last_location: None,
        }
    }

    fn host_with(books: &[CatalogEntry]) -> (ReaderHost, Arc<AtomicBool>, Arc<dyn CatalogStore>) {
        let catalog: Arc<dyn CatalogStore> = Arc::new(MemoryCatalogStore::new());
        for book in books {
            catalog.put(book.clone()).unwrap();
        }
        let gate_open = Arc::new(AtomicBool::new(false));
        let mut config = AppConfig::default();
        config.viewport_columns = 40;
        config.viewport_rows = 10;
        let host = ReaderHost::new(
            config,
            HostServices {
                catalog: catalog.clone(),
                settings: Box::new(MemorySettingsStore::new()),
                hasher: Arc::new(FullDigestHasher),
                extractor: Arc::new(TitleOnly),
                source: Arc::new(GatedSource {
                    gate_open: gate_open.clone(),
                }),
                binder_factory: Arc::new(|| Box::new(TextSurfaceBinder) as Box<dyn SurfaceBinder>),
            },
        );
        (host, gate_open, catalog)
    }

    #[tokio::test]
    async fn open_navigate_and_close_writes_location_back() {
        let (host, _gate, catalog) = host_with(&[entry("abc123", "/books/foo.epub")]);
        let mut events = host.subscribe();
        let host = Mutex::new(host);

        let snapshot = open_book(&host, "abc").await.unwrap();
        assert_eq!(snapshot.title, "/books/foo.epub");
        assert_eq!(snapshot.location, Some(Bookmark::new("0:0")));

        let l3 = {
            let mut guard = host.lock().unwrap();
            for _ in 0..3 {
                guard.navigate(NavDirection::Next).unwrap();
            }
            let l3 = guard.snapshot().unwrap().location.unwrap();
            guard.change_layout_mode(LayoutMode::DoublePage).unwrap();
            assert_eq!(guard.snapshot().unwrap().location, Some(l3.clone()));
            assert!(guard.close_session());
            l3
        };

        let stored = catalog.get(&ContentHash::new("abc123")).unwrap().unwrap();
        assert_eq!(stored.last_location, Some(l3.clone()));

        let mut names = Vec::new();
        while let Ok(event) = events.try_recv() {
            names.push(event.name());
        }
        assert_eq!(names.first(), Some(&"source-open"));
        assert_eq!(names.iter().filter(|name| **name == "relocated").count(), 3);
        assert!(names.contains(&"layout-mode-changed"));
        assert_eq!(names.last(), Some(&"session-closed"));

        // Reopening restores the saved location in the persisted layout.
        let snapshot = open_book(&host, "abc123").await.unwrap();
        assert_eq!(snapshot.location, Some(l3));
        assert_eq!(snapshot.layout_mode, LayoutMode::DoublePage);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn newer_open_supersedes_one_in_flight() {
        let (host, gate, _catalog) = host_with(&[
            entry("aaa111", "/books/slow.epub"),
            entry("bbb222", "/books/fast.epub"),
        ]);
        let host = Arc::new(Mutex::new(host));

        let first = tokio::spawn({
            let host = host.clone();
            async move { open_book(&host, "aaa").await }
        });
        let deadline = Instant::now() + Duration::from_secs(5);
        while host.lock().unwrap().open_in_flight().is_none() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }

        let second = open_book(&host, "bbb").await.unwrap();
        assert_eq!(second.hash, ContentHash::new("bbb222"));

        gate.store(true, Ordering::SeqCst);
        let first = first.await.unwrap();
        assert!(matches!(
            first,
            Err(HostError::Session(SessionError::Cancelled { .. }))
        ));

        let guard = host.lock().unwrap();
        assert_eq!(guard.snapshot().unwrap().hash, ContentHash::new("bbb222"));
        assert_eq!(guard.open_in_flight(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn close_while_loading_cancels_the_open() {
        let (host, gate, _catalog) = host_with(&[entry("aaa111", "/books/slow.epub")]);
        let mut events = host.subscribe();
        let host = Arc::new(Mutex::new(host));

        let pending = tokio::spawn({
            let host = host.clone();
            async move { open_book(&host, "aaa").await }
        });
        let deadline = Instant::now() + Duration::from_secs(5);
        while host.lock().unwrap().open_in_flight().is_none() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }

        {
            let mut guard = host.lock().unwrap();
            assert!(guard.close_session());
            assert_eq!(guard.open_in_flight(), None);
            assert_eq!(
                guard
                    .handle_key(InputScope::Window, &KeyPress::plain("q"), Instant::now())
                    .unwrap(),
                Some(KeyAction::Close)
            );
        }

        gate.store(true, Ordering::SeqCst);
        let outcome = pending.await.unwrap();
        assert!(matches!(
            outcome,
            Err(HostError::Session(SessionError::Cancelled { .. }))
        ));
        assert!(host.lock().unwrap().snapshot().is_none());

        let mut cancelled = None;
        while let Ok(event) = events.try_recv() {
            if let HostEvent::SourceOpen {
                hash,
                phase: OpenPhase::Cancelled,
                ..
            } = event
            {
                cancelled = Some(hash);
            }
        }
        assert_eq!(cancelled, Some(ContentHash::new("aaa111")));
    }

    #[tokio::test]
    async fn failed_open_reports_load_failure_and_installs_nothing() {
        let (host, _gate, _catalog) = host_with(&[entry("ccc333", "/books/corrupt.epub")]);
        let host = Mutex::new(host);
        let err = open_book(&host, "ccc").await.unwrap_err();
        assert!(matches!(err, HostError::Session(SessionError::LoadFailed { .. })));
        assert!(host.lock().unwrap().snapshot().is_none());

        let err = open_book(&host, "zzz").await.unwrap_err();
        assert!(matches!(err, HostError::UnknownBook { .. }));
    }

    #[tokio::test]
    async fn ingest_paths_adds_books_and_rejects_concurrent_batches() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("Dune.epub");
        std::fs::write(&path, b"spice").unwrap();

        let (host, _gate, _catalog) = host_with(&[]);
        let mut events = host.subscribe();
        let host = Mutex::new(host);

        let report = ingest_paths(&host, vec![path.clone(), path]).await.unwrap();
        assert_eq!(report.added().count(), 1);
        assert_eq!(report.outcomes.len(), 2);
        let books = host.lock().unwrap().list_books().unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].title, "Dune");
        assert_eq!(books[0].author, crate::catalog::UNKNOWN_AUTHOR);
        assert!(matches!(events.try_recv(), Ok(HostEvent::BookAdded { .. })));

        host.lock().unwrap().ingest_in_flight = true;
        let err = ingest_paths(&host, Vec::new()).await.unwrap_err();
        assert!(matches!(err, HostError::OperationConflict("ingestion")));
    }

    #[tokio::test]
    async fn keys_drive_navigation_and_echoes_are_dropped() {
        let (host, _gate, _catalog) = host_with(&[entry("abc123", "/books/foo.epub")]);
        let host = Mutex::new(host);
        open_book(&host, "abc").await.unwrap();

        let mut guard = host.lock().unwrap();
        guard.set_input_focus(InputScope::Surface);
        let t0 = Instant::now();
        let right = KeyPress::plain("right");
        assert_eq!(
            guard.handle_key(InputScope::Surface, &right, t0).unwrap(),
            Some(KeyAction::NextPage)
        );
        let after_one = guard.snapshot().unwrap().location;
        assert_eq!(
            guard
                .handle_key(InputScope::Window, &right, t0 + Duration::from_millis(2))
                .unwrap(),
            None
        );
        assert_eq!(guard.snapshot().unwrap().location, after_one);

        assert_eq!(
            guard
                .handle_key(InputScope::Surface, &KeyPress::plain("t"), t0)
                .unwrap(),
            Some(KeyAction::ToggleToc)
        );
        assert!(guard.panels().show_toc);
        guard.jump_to_toc(1).unwrap();
        assert!(!guard.panels().show_toc);

        guard
            .handle_key(InputScope::Surface, &KeyPress::plain("m"), t0)
            .unwrap();
        assert_eq!(guard.layout_mode(), LayoutMode::DoublePage);

        guard
            .handle_key(InputScope::Surface, &KeyPress::plain("q"), t0)
            .unwrap();
        assert!(guard.snapshot().is_none());
        assert!(matches!(
            guard.navigate(NavDirection::Next),
            Err(HostError::NoSession)
        ));
    }

    #[tokio::test]
    async fn theme_and_clear_library() {
        let (host, _gate, catalog) = host_with(&[entry("abc123", "/books/foo.epub")]);
        let host = Mutex::new(host);
        open_book(&host, "abc").await.unwrap();

        let mut guard = host.lock().unwrap();
        let theme = guard.apply_theme(ThemePatch {
            font_scale_percent: Some(150),
            ..ThemePatch::default()
        });
        assert_eq!(theme.font_scale_percent, 150);
        assert_eq!(guard.snapshot().unwrap().theme.font_scale_percent, 150);

        assert_eq!(guard.clear_library().unwrap(), 1);
        assert!(guard.snapshot().is_none());
        assert!(catalog.list_all().unwrap().is_empty());
        guard.shutdown();
    }
}
