use super::surface::{Rect, Surface};
use crate::engine::{
    EngineDelegate, EngineError, EngineSettings, LayoutEngine, RequestTicket, SessionKey,
};
use crate::metrics::PreviewMetrics;
use crate::models::{
    Bitmap, DocumentId, DocumentModel, DocumentRef, OpenStatus, PageCursor, PreviewConfig,
    Viewport,
};
use crate::services::{StageMode, StagingError, TempFileStager};
use crate::state::{EventBus, ModelRegistry, PreviewEvent, PreviewPhase, RenderGate};
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// Pointer button reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
    Other(u16),
}

/// Host-thread bookkeeping that is not shared with the engine directly.
#[derive(Debug)]
struct Session {
    source: Option<Utf8PathBuf>,
    staged: Option<Utf8PathBuf>,
    viewport: Viewport,
    geometry_dirty: bool,
    generation: u64,
    phase: PreviewPhase,
    stable_phase: PreviewPhase,
    render_started: Option<Instant>,
    /// Page of the render currently in flight for this generation.
    render_page: Option<usize>,
    released: bool,
}

impl Session {
    fn enter(&mut self, phase: PreviewPhase) {
        if self.phase.is_stable() {
            self.stable_phase = self.phase;
        }
        self.phase = phase;
        if phase.is_stable() {
            self.stable_phase = phase;
        }
    }

    fn fall_back(&mut self) {
        self.phase = self.stable_phase;
    }

    /// Make every outstanding ticket stale.
    fn invalidate(&mut self) {
        self.generation += 1;
        self.render_started = None;
        self.render_page = None;
    }
}

/// Drives one layout engine: staging, opening, paging and painting.
///
/// The host thread calls the public operations; the engine reports back
/// through [`EngineDelegate`] from whatever thread it likes. Every request
/// carries a [`RequestTicket`], and completions whose ticket or document no
/// longer match the live session are dropped before they touch any state.
///
/// Shared state is split into independently locked cells (render gate, model
/// registry, cursor, frame, session). None of those locks is held while
/// calling into the engine.
pub struct PreviewController {
    engine: Arc<dyn LayoutEngine>,
    config: PreviewConfig,
    session_key: SessionKey,
    stager: TempFileStager,
    gate: RenderGate,
    registry: ModelRegistry,
    cursor: Mutex<PageCursor>,
    frame: RwLock<Option<Arc<Bitmap>>>,
    session: Mutex<Session>,
    events: EventBus,
    metrics: Arc<PreviewMetrics>,
    this: Weak<PreviewController>,
}

impl PreviewController {
    /// Create a controller bound to `engine`.
    ///
    /// Applies the configured viewport margins, then initializes the engine.
    ///
    /// # Arguments
    /// * `engine` - Layout engine that opens and rasterizes documents
    /// * `config` - Margins, initial viewport, staging prefix and timeouts
    ///
    /// # Returns
    /// The controller, or the engine's initialization error
    pub fn new(engine: Arc<dyn LayoutEngine>, config: PreviewConfig) -> Result<Arc<Self>, EngineError> {
        engine.set_viewport_margins(config.margin_top, config.margin_bottom);

        let settings = EngineSettings {
            resource_dir: config
                .resource_dir
                .as_deref()
                .filter(|dir| !dir.is_empty())
                .map(Utf8PathBuf::from),
            render_timeout: config.render_timeout(),
        };
        engine.initialize(&settings)?;

        let viewport = Viewport::new(config.initial_width, config.initial_height);
        tracing::info!(
            "Preview controller created (viewport {}x{}, session key {})",
            viewport.width,
            viewport.height,
            config.session_key
        );

        Ok(Arc::new_cyclic(|this| Self {
            engine,
            session_key: SessionKey::new(config.session_key.clone()),
            stager: TempFileStager::new(config.temp_prefix.clone()),
            gate: RenderGate::new(),
            registry: ModelRegistry::new(),
            cursor: Mutex::new(PageCursor::new()),
            frame: RwLock::new(None),
            session: Mutex::new(Session {
                source: None,
                staged: None,
                viewport,
                geometry_dirty: true,
                generation: 0,
                phase: PreviewPhase::Closed,
                stable_phase: PreviewPhase::Closed,
                render_started: None,
                render_page: None,
                released: false,
            }),
            events: EventBus::new(config.event_capacity),
            metrics: Arc::new(PreviewMetrics::new()),
            config,
            this: this.clone(),
        }))
    }

    // ---- Host operations ----

    /// Stage `path` (keeping an existing staged copy) and ask the engine to
    /// open the staged copy. Completion arrives via `on_open_complete`.
    pub fn open(&self, path: impl AsRef<Utf8Path>) {
        if self.is_released() {
            return;
        }
        self.stage_and_open(path.as_ref(), StageMode::KeepExisting);
    }

    /// Reopen `path` from page 0.
    ///
    /// # Arguments
    /// * `path` - Source document to stage and open
    /// * `force` - Reload even when nothing is loaded; also overwrites the
    ///   staged copy when `restage_on_forced_reload` is set
    ///
    /// # Returns
    /// `false` when nothing was loaded and `force` was not set
    pub fn reload(&self, path: impl AsRef<Utf8Path>, force: bool) -> bool {
        if self.is_released() {
            return false;
        }
        if !force && !self.registry.is_loaded() {
            tracing::debug!("Reload skipped: no document loaded");
            return false;
        }

        self.session().invalidate();
        self.release_document();
        self.cursor().reset();

        let mode = if force && self.config.restage_on_forced_reload {
            StageMode::Overwrite
        } else {
            StageMode::KeepExisting
        };
        self.stage_and_open(path.as_ref(), mode);
        true
    }

    /// Replace the staged copy's content with `text` and reopen it.
    ///
    /// The source document is never written.
    pub fn update_content(&self, text: &str) {
        if self.is_released() {
            return;
        }
        let staged = {
            let mut session = self.session();
            let Some(staged) = session.staged.clone() else {
                tracing::warn!("Content update ignored: no staged document");
                return;
            };
            session.invalidate();
            staged
        };

        self.release_document();

        if let Err(e) = self.stager.write_content(&staged, text) {
            tracing::warn!("Failed to update staged copy {}: {}", staged, e);
        }

        self.request_open(&staged);
    }

    /// Go to the next page. Returns `true` when a render was requested.
    pub fn handle_primary_advance(&self) -> bool {
        self.navigate(true)
    }

    /// Go to the previous page. Returns `true` when a render was requested.
    pub fn handle_secondary_retreat(&self) -> bool {
        self.navigate(false)
    }

    /// Route a pointer press. Primary advances and secondary retreats;
    /// other buttons are ignored.
    pub fn handle_pointer(&self, button: PointerButton) -> bool {
        match button {
            PointerButton::Primary => self.handle_primary_advance(),
            PointerButton::Secondary => self.handle_secondary_retreat(),
            other => {
                tracing::trace!("Ignoring pointer button {:?}", other);
                false
            }
        }
    }

    /// Record a new viewport size. Applied to the engine before the next
    /// render or open.
    pub fn resize(&self, width: u32, height: u32) {
        let mut session = self.session();
        if session.released {
            return;
        }
        session.viewport = Viewport::new(width, height);
        session.geometry_dirty = true;
        tracing::debug!("Viewport resized to {}x{}", width, height);
    }

    /// Release the current document and frame without opening anything.
    pub fn close(&self) {
        if self.is_released() {
            return;
        }
        self.close_session();
    }

    /// Draw the current frame scaled to fill `width` x `height`.
    ///
    /// # Returns
    /// `false` without touching the surface when there is no frame, the frame
    /// is empty or the surface is inactive
    pub fn paint<S: Surface + ?Sized>(&self, surface: &mut S, width: u32, height: u32) -> bool {
        let Some(frame) = self.current_frame().filter(|frame| !frame.is_empty()) else {
            return false;
        };
        if !surface.is_active() {
            return false;
        }

        let target = Rect::sized(width, height);
        surface.erase(target);
        surface.draw_image(target, &frame);
        true
    }

    /// Close everything and shut the engine down. Later calls are no-ops.
    pub fn teardown(&self) {
        if self.is_released() {
            return;
        }

        self.close_session();
        {
            let mut session = self.session();
            session.source = None;
            session.staged = None;
            session.released = true;
        }

        self.engine.shutdown();
        tracing::info!("Preview controller torn down");
        self.metrics.log_summary();
    }

    /// Remove staged copies left in the source document's directory.
    pub fn purge_stale_copies(&self) -> Result<usize, StagingError> {
        let directory = {
            let session = self.session();
            session
                .staged
                .as_deref()
                .and_then(Utf8Path::parent)
                .map(Utf8Path::to_path_buf)
        };

        match directory {
            Some(directory) => self.stager.purge_stale(&directory),
            None => Ok(0),
        }
    }

    // ---- Accessors ----

    /// Current lifecycle phase.
    pub fn phase(&self) -> PreviewPhase {
        self.session().phase
    }

    /// Requested page, possibly not rendered yet.
    pub fn page_index(&self) -> usize {
        self.cursor().pending()
    }

    /// Page shown by the current frame.
    pub fn committed_page(&self) -> usize {
        self.cursor().committed()
    }

    /// Last successfully rendered page, if any.
    pub fn current_frame(&self) -> Option<Arc<Bitmap>> {
        self.frame
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a render is in flight. Navigation is dropped while it is.
    pub fn is_rendering(&self) -> bool {
        self.gate.is_rendering()
    }

    /// Handle of the loaded document.
    pub fn current_model(&self) -> Option<DocumentRef> {
        self.registry.current()
    }

    pub fn source_path(&self) -> Option<Utf8PathBuf> {
        self.session().source.clone()
    }

    /// Temporary copy the engine actually opens.
    pub fn staged_path(&self) -> Option<Utf8PathBuf> {
        self.session().staged.clone()
    }

    pub fn viewport(&self) -> Viewport {
        self.session().viewport
    }

    /// Receive [`PreviewEvent`]s emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<PreviewEvent> {
        self.events.subscribe()
    }

    pub fn metrics(&self) -> Arc<PreviewMetrics> {
        Arc::clone(&self.metrics)
    }

    // ---- Internals ----

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cursor(&self) -> MutexGuard<'_, PageCursor> {
        self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_released(&self) -> bool {
        self.session().released
    }

    fn delegate(&self) -> Weak<dyn EngineDelegate> {
        self.this.clone()
    }

    fn ticket(&self, generation: u64) -> RequestTicket {
        RequestTicket::new(self.session_key.clone(), generation)
    }

    fn is_current(session: &Session, key: &SessionKey, ticket: &RequestTicket) -> bool {
        !session.released && ticket.session == *key && ticket.generation == session.generation
    }

    fn stage_and_open(&self, source: &Utf8Path, mode: StageMode) {
        let staged = match self.stager.stage(source, mode) {
            Ok(outcome) => Some(outcome.staged_path().to_path_buf()),
            Err(e) => {
                tracing::warn!("Failed to stage {}: {}", source, e);
                self.stager.derive_path(source)
            }
        };

        {
            let mut session = self.session();
            session.source = Some(source.to_path_buf());
            session.staged = staged.clone();
        }

        // Without a staged path the engine is pointed at nothing and reports
        // the failure itself.
        self.request_open(&staged.unwrap_or_default());
    }

    fn request_open(&self, target: &Utf8Path) {
        let generation = {
            let mut session = self.session();
            session.invalidate();
            session.enter(PreviewPhase::Opening);
            session.generation
        };

        self.apply_geometry(true);
        self.metrics.record_open_requested();
        tracing::info!("Opening {} (generation {})", target, generation);
        self.engine
            .open_document(self.delegate(), target, self.ticket(generation));
    }

    /// Push the viewport to the engine. With `force` unset this only happens
    /// after a resize.
    fn apply_geometry(&self, force: bool) {
        let viewport = {
            let mut session = self.session();
            if !force && !session.geometry_dirty {
                return;
            }
            session.geometry_dirty = false;
            session.viewport
        };

        self.engine
            .set_page_size(viewport.width, viewport.height, self.config.scale);
    }

    fn navigate(&self, forward: bool) -> bool {
        let Some((generation, document)) = self.session_target() else {
            tracing::trace!("Navigation ignored: no document loaded");
            return false;
        };
        if !self.gate.try_begin() {
            self.metrics.record_input_dropped();
            tracing::trace!("Navigation dropped: render in flight");
            return false;
        }

        let page = {
            let mut cursor = self.cursor();
            if forward {
                cursor.advance(document.page_count)
            } else {
                cursor.retreat()
            }
        };
        let Some(page) = page else {
            self.gate.set_rendering(false);
            return false;
        };

        if self.request_render(document, page, generation) {
            return true;
        }

        // The session moved on after the move. Undo it unless a newer render
        // already owns the gate.
        let session = self.session();
        if session.render_page.is_none() {
            self.cursor().revert_page(page);
            self.gate.set_rendering(false);
        }
        false
    }

    /// Generation and document that a navigation would render against.
    fn session_target(&self) -> Option<(u64, DocumentRef)> {
        let session = self.session();
        if session.released {
            return None;
        }
        self.registry
            .current()
            .map(|document| (session.generation, document))
    }

    /// Ask the engine for `page` of `document`.
    ///
    /// Returns `false` without calling the engine when `generation` is no
    /// longer current or `document` is no longer registered.
    fn request_render(&self, document: DocumentRef, page: usize, generation: u64) -> bool {
        self.apply_geometry(false);

        {
            let mut session = self.session();
            if session.released
                || session.generation != generation
                || self.registry.current_id() != Some(document.id)
            {
                tracing::debug!("Render of page {} skipped: session moved on", page);
                return false;
            }
            self.gate.set_rendering(true);
            session.enter(PreviewPhase::Paginating);
            session.render_started = Some(Instant::now());
            session.render_page = Some(page);
        }

        self.metrics.record_render_requested();
        tracing::debug!("Requesting page {} of {}", page, document.id);
        self.engine
            .render_page(document, page, self.ticket(generation));
        true
    }

    /// Drop the frame, close the model and clear the gate.
    fn release_document(&self) {
        *self.frame.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.registry
            .clear(|model| self.engine.close_document(model));
        self.gate.set_rendering(false);
    }

    fn close_session(&self) {
        {
            let mut session = self.session();
            session.invalidate();
            session.enter(PreviewPhase::Closed);
        }
        self.release_document();
        tracing::info!("Preview closed");
        self.events.emit(PreviewEvent::Closed);
    }

    fn drop_stale(&self, what: &str, model: Option<DocumentModel>) {
        self.metrics.record_stale_callback();
        tracing::debug!("Ignoring stale {} callback", what);
        if let Some(model) = model {
            self.engine.close_document(model);
        }
        self.events.emit(PreviewEvent::StaleCallbackDropped);
    }
}

impl EngineDelegate for PreviewController {
    fn on_open_complete(&self, ticket: RequestTicket, model: Option<DocumentModel>, status: OpenStatus) {
        let mut session = self.session();
        if !Self::is_current(&session, &self.session_key, &ticket) {
            drop(session);
            self.drop_stale("open", model);
            return;
        }
        let opened_path = session.staged.clone().unwrap_or_default();

        let model = match (status.is_success(), model) {
            (true, Some(model)) => model,
            (_, model) => {
                session.fall_back();
                session.render_page = None;
                self.gate.set_rendering(false);
                drop(session);

                if let Some(model) = model {
                    self.engine.close_document(model);
                }
                self.metrics.record_open_failed();
                tracing::warn!("Failed to open {}: {}", opened_path, status);
                self.events.emit(PreviewEvent::OpenFailed {
                    path: opened_path,
                    status,
                });
                return;
            }
        };

        // Installed under the session lock: a close or reopen either runs
        // after this and releases the model, or ran before and made the
        // ticket stale.
        let document = model.to_ref();
        *self.frame.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.gate.set_rendering(false);
        session.render_page = None;
        let previous = self.registry.replace(model);
        let page = {
            let mut cursor = self.cursor();
            cursor.clamp_to(document.page_count);
            cursor.pending()
        };
        session.enter(PreviewPhase::Ready);
        let generation = session.generation;
        drop(session);

        if let Some(previous) = previous {
            tracing::debug!("Closing displaced model {}", previous.id());
            self.engine.close_document(previous);
        }

        tracing::info!("Opened {} with {} pages", document.id, document.page_count);
        self.events.emit(PreviewEvent::DocumentOpened {
            document: document.id,
            page_count: document.page_count,
        });

        self.request_render(document, page, generation);
    }

    fn on_render_complete(&self, ticket: RequestTicket, document: DocumentId, bitmap: Option<Bitmap>) {
        let event = {
            let mut session = self.session();
            if !Self::is_current(&session, &self.session_key, &ticket)
                || self.registry.current_id() != Some(document)
            {
                drop(session);
                self.drop_stale("render", None);
                return;
            }

            self.gate.set_rendering(false);
            let requested = session.render_page.take();
            let elapsed = session
                .render_started
                .take()
                .map(|start| start.elapsed())
                .unwrap_or(Duration::ZERO);

            match bitmap {
                Some(bitmap) => {
                    *self.frame.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(bitmap));
                    let page = {
                        let mut cursor = self.cursor();
                        let page = requested.unwrap_or(cursor.pending());
                        cursor.commit_page(page);
                        cursor.committed()
                    };
                    session.enter(PreviewPhase::Ready);
                    self.metrics.record_render_complete(true, elapsed);
                    tracing::debug!("Page {} of {} ready", page, document);
                    PreviewEvent::RepaintRequested { page }
                }
                None => {
                    let (requested, reverted_to) = {
                        let mut cursor = self.cursor();
                        let requested = requested.unwrap_or_else(|| cursor.pending());
                        cursor.revert_page(requested);
                        (requested, cursor.committed())
                    };
                    session.fall_back();
                    self.metrics.record_render_complete(false, elapsed);
                    tracing::warn!(
                        "Render of page {} of {} failed, back to page {}",
                        requested,
                        document,
                        reverted_to
                    );
                    PreviewEvent::RenderFailed {
                        requested,
                        reverted_to,
                    }
                }
            }
        };

        self.events.emit(event);
    }
}

impl Drop for PreviewController {
    fn drop(&mut self) {
        self.teardown();
    }
}
