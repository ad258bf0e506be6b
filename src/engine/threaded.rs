// ThreadedEngine - runs a synchronous rasterizer behind the asynchronous engine contract
//
// Parsing and rasterizing are blocking work, so each request is moved onto
// tokio's blocking pool and its completion is delivered to the delegate from
// a runtime worker thread. Render requests are bounded by an optional timeout;
// a render that overruns it is reported as a failed render.

use super::{EngineDelegate, EngineError, EngineSettings, LayoutEngine, RequestTicket};
use crate::models::{Bitmap, DocumentId, DocumentModel, DocumentRef, OpenStatus, PageGeometry};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// Synchronous layout backend driven by [`ThreadedEngine`].
///
/// Both methods run on tokio's blocking pool and may take as long as they
/// need; the engine never calls them from the host thread.
pub trait DocumentRasterizer: Send + Sync + 'static {
    type Document: Send + Sync + 'static;

    fn initialize(&self, _settings: &EngineSettings) -> Result<(), EngineError> {
        Ok(())
    }

    /// Parse and lay out the document at `path`.
    fn parse(&self, path: &Utf8Path, geometry: &PageGeometry) -> Result<Self::Document, OpenStatus>;

    fn page_count(&self, document: &Self::Document) -> usize;

    /// Rasterize one page. `None` signals a failed render.
    fn rasterize(&self, document: &Self::Document, page: usize, geometry: &PageGeometry) -> Option<Bitmap>;
}

type DelegateSlot = Mutex<Option<Weak<dyn EngineDelegate>>>;

/// [`LayoutEngine`] backed by a [`DocumentRasterizer`] and a tokio runtime.
///
/// The page count is fixed when a document is opened; rasterization uses the
/// page size current at render time, so a resize takes effect on the next
/// render.
pub struct ThreadedEngine<R: DocumentRasterizer> {
    rasterizer: Arc<R>,
    tokio_handle: tokio::runtime::Handle,
    geometry: Mutex<PageGeometry>,
    render_timeout: Mutex<Option<Duration>>,
    delegate: Arc<DelegateSlot>,
    documents: Arc<Mutex<HashMap<DocumentId, Arc<R::Document>>>>,
    next_id: AtomicU64,
    shut_down: AtomicBool,
}

impl<R: DocumentRasterizer> ThreadedEngine<R> {
    pub fn new(rasterizer: R, tokio_handle: tokio::runtime::Handle) -> Self {
        Self {
            rasterizer: Arc::new(rasterizer),
            tokio_handle,
            geometry: Mutex::new(PageGeometry::default()),
            render_timeout: Mutex::new(None),
            delegate: Arc::new(Mutex::new(None)),
            documents: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Number of documents currently held open.
    pub fn open_documents(&self) -> usize {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn geometry(&self) -> PageGeometry {
        *self.geometry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_delegate(slot: &DelegateSlot) -> Option<Arc<dyn EngineDelegate>> {
        slot.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade)
    }
}

impl<R: DocumentRasterizer> LayoutEngine for ThreadedEngine<R> {
    fn set_viewport_margins(&self, top: u32, bottom: u32) {
        let mut geometry = self.geometry.lock().unwrap_or_else(PoisonError::into_inner);
        geometry.margin_top = top;
        geometry.margin_bottom = bottom;
    }

    fn set_page_size(&self, width: u32, height: u32, scale: f32) {
        let mut geometry = self.geometry.lock().unwrap_or_else(PoisonError::into_inner);
        geometry.width = width;
        geometry.height = height;
        geometry.scale = scale;
        tracing::debug!("Engine page size set to {}x{} @ {}", width, height, scale);
    }

    fn initialize(&self, settings: &EngineSettings) -> Result<(), EngineError> {
        if let Some(dir) = &settings.resource_dir {
            if !dir.is_dir() {
                return Err(EngineError::MissingResources(dir.clone()));
            }
        }

        *self.render_timeout.lock().unwrap_or_else(PoisonError::into_inner) = settings.render_timeout;
        self.rasterizer.initialize(settings)?;

        tracing::info!(
            "Threaded engine initialized (render timeout: {:?})",
            settings.render_timeout
        );
        Ok(())
    }

    fn open_document(&self, delegate: Weak<dyn EngineDelegate>, path: &Utf8Path, ticket: RequestTicket) {
        if self.shut_down.load(Ordering::Acquire) {
            tracing::warn!("Open of {} ignored: engine shut down", path);
            return;
        }

        *self.delegate.lock().unwrap_or_else(PoisonError::into_inner) = Some(delegate.clone());

        let id = DocumentId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let geometry = self.geometry();
        let rasterizer = Arc::clone(&self.rasterizer);
        let documents = Arc::clone(&self.documents);
        let path: Utf8PathBuf = path.to_path_buf();

        self.tokio_handle.spawn(async move {
            let parse_rasterizer = Arc::clone(&rasterizer);
            let parse_path = path.clone();
            let parsed =
                tokio::task::spawn_blocking(move || parse_rasterizer.parse(&parse_path, &geometry))
                    .await;

            let (model, status) = match parsed {
                Ok(Ok(document)) => {
                    let page_count = rasterizer.page_count(&document);
                    documents
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(id, Arc::new(document));
                    tracing::debug!("Opened {} as {} ({} pages)", path, id, page_count);
                    (Some(DocumentModel::new(id, page_count, path)), OpenStatus::Success)
                }
                Ok(Err(status)) => {
                    tracing::warn!("Failed to open {}: {}", path, status);
                    (None, status)
                }
                Err(join_error) => {
                    tracing::error!("Parse task for {} panicked: {}", path, join_error);
                    (None, OpenStatus::ParseFailed(join_error.to_string()))
                }
            };

            match delegate.upgrade() {
                Some(delegate) => delegate.on_open_complete(ticket, model, status),
                None => {
                    if let Some(model) = model {
                        documents
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .remove(&model.id());
                    }
                }
            }
        });
    }

    fn render_page(&self, document: DocumentRef, page: usize, ticket: RequestTicket) {
        let delegate = Arc::clone(&self.delegate);
        let parsed = self
            .documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&document.id)
            .cloned();
        let geometry = self.geometry();
        let render_timeout = *self.render_timeout.lock().unwrap_or_else(PoisonError::into_inner);
        let rasterizer = Arc::clone(&self.rasterizer);

        self.tokio_handle.spawn(async move {
            let start = Instant::now();

            let bitmap = match parsed {
                None => {
                    tracing::warn!("Render requested for unknown document {}", document.id);
                    None
                }
                Some(parsed) => {
                    let job = tokio::task::spawn_blocking(move || {
                        rasterizer.rasterize(&parsed, page, &geometry)
                    });

                    let joined = match render_timeout {
                        Some(limit) => match timeout(limit, job).await {
                            Ok(joined) => joined,
                            Err(_) => {
                                tracing::warn!(
                                    "Render of page {} of {} timed out after {:?}",
                                    page,
                                    document.id,
                                    limit
                                );
                                Ok(None)
                            }
                        },
                        None => job.await,
                    };

                    joined.unwrap_or_else(|join_error| {
                        tracing::error!("Render task panicked: {}", join_error);
                        None
                    })
                }
            };

            tracing::debug!(
                "Rendered page {} of {} in {:.2}ms (ok: {})",
                page,
                document.id,
                start.elapsed().as_secs_f64() * 1000.0,
                bitmap.is_some()
            );

            if let Some(delegate) = Self::current_delegate(&delegate) {
                delegate.on_render_complete(ticket, document.id, bitmap);
            }
        });
    }

    fn close_document(&self, model: DocumentModel) {
        let removed = self
            .documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&model.id());

        if removed.is_some() {
            tracing::debug!("Closed {}", model.id());
        }
    }

    fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        *self.delegate.lock().unwrap_or_else(PoisonError::into_inner) = None;
        tracing::info!("Threaded engine shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SessionKey;
    use std::fs;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    /// Paginates by line count and renders each page as a flat colour.
    struct LineRasterizer {
        lines_per_page: usize,
        delay: Duration,
    }

    impl DocumentRasterizer for LineRasterizer {
        type Document = usize;

        fn parse(&self, path: &Utf8Path, _geometry: &PageGeometry) -> Result<usize, OpenStatus> {
            let text = fs::read_to_string(path).map_err(|_| OpenStatus::FileNotFound)?;
            Ok(text.lines().count())
        }

        fn page_count(&self, lines: &usize) -> usize {
            lines.div_ceil(self.lines_per_page).max(1)
        }

        fn rasterize(&self, lines: &usize, page: usize, geometry: &PageGeometry) -> Option<Bitmap> {
            std::thread::sleep(self.delay);
            if page >= self.page_count(lines) {
                return None;
            }
            Some(Bitmap::filled(geometry.width, geometry.height, page as u32))
        }
    }

    #[derive(Debug)]
    enum Completion {
        Open(RequestTicket, Option<DocumentModel>, OpenStatus),
        Render(RequestTicket, DocumentId, Option<Bitmap>),
    }

    struct ChannelDelegate {
        tx: mpsc::UnboundedSender<Completion>,
    }

    impl EngineDelegate for ChannelDelegate {
        fn on_open_complete(&self, ticket: RequestTicket, model: Option<DocumentModel>, status: OpenStatus) {
            let _ = self.tx.send(Completion::Open(ticket, model, status));
        }

        fn on_render_complete(&self, ticket: RequestTicket, document: DocumentId, bitmap: Option<Bitmap>) {
            let _ = self.tx.send(Completion::Render(ticket, document, bitmap));
        }
    }

    fn ticket(generation: u64) -> RequestTicket {
        RequestTicket::new(SessionKey::new("test"), generation)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Completion>) -> Completion {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("Timeout waiting for engine callback")
            .expect("Channel closed")
    }

    fn write_doc(lines: usize) -> (TempDir, Utf8PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let path = dir.join("__Temp__doc.html");
        let body: Vec<String> = (0..lines).map(|i| format!("<p>{}</p>", i)).collect();
        fs::write(&path, body.join("\n")).unwrap();
        (temp_dir, path)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_open_and_render_roundtrip() {
        let (_guard, path) = write_doc(25);
        let engine = ThreadedEngine::new(
            LineRasterizer { lines_per_page: 10, delay: Duration::ZERO },
            tokio::runtime::Handle::current(),
        );
        engine.set_page_size(40, 30, 1.0);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let delegate: Arc<dyn EngineDelegate> = Arc::new(ChannelDelegate { tx });
        engine.open_document(Arc::downgrade(&delegate), &path, ticket(1));

        let model = match next(&mut rx).await {
            Completion::Open(t, Some(model), OpenStatus::Success) => {
                assert_eq!(t, ticket(1));
                model
            }
            other => panic!("Expected successful open, got: {:?}", other),
        };
        assert_eq!(model.page_count(), 3);
        assert_eq!(engine.open_documents(), 1);

        engine.render_page(model.to_ref(), 2, ticket(1));
        match next(&mut rx).await {
            Completion::Render(_, id, Some(bitmap)) => {
                assert_eq!(id, model.id());
                assert_eq!((bitmap.width(), bitmap.height()), (40, 30));
                assert_eq!(bitmap.pixel(0, 0), Some(2));
            }
            other => panic!("Expected rendered page, got: {:?}", other),
        }

        engine.close_document(model);
        assert_eq!(engine.open_documents(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_missing_file_reports_failure() {
        let engine = ThreadedEngine::new(
            LineRasterizer { lines_per_page: 10, delay: Duration::ZERO },
            tokio::runtime::Handle::current(),
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        let delegate: Arc<dyn EngineDelegate> = Arc::new(ChannelDelegate { tx });
        engine.open_document(
            Arc::downgrade(&delegate),
            Utf8Path::new("/definitely/not/here.html"),
            ticket(1),
        );

        match next(&mut rx).await {
            Completion::Open(_, None, OpenStatus::FileNotFound) => {}
            other => panic!("Expected FileNotFound, got: {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_render_timeout_reports_failure() {
        let (_guard, path) = write_doc(5);
        let engine = ThreadedEngine::new(
            LineRasterizer { lines_per_page: 10, delay: Duration::from_millis(500) },
            tokio::runtime::Handle::current(),
        );
        engine
            .initialize(&EngineSettings {
                resource_dir: None,
                render_timeout: Some(Duration::from_millis(20)),
            })
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let delegate: Arc<dyn EngineDelegate> = Arc::new(ChannelDelegate { tx });
        engine.open_document(Arc::downgrade(&delegate), &path, ticket(1));

        let model = match next(&mut rx).await {
            Completion::Open(_, Some(model), _) => model,
            other => panic!("Expected successful open, got: {:?}", other),
        };

        engine.render_page(model.to_ref(), 0, ticket(1));
        match next(&mut rx).await {
            Completion::Render(_, _, None) => {}
            other => panic!("Expected timed-out render, got: {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_render_unknown_document_fails() {
        let (_guard, path) = write_doc(5);
        let engine = ThreadedEngine::new(
            LineRasterizer { lines_per_page: 10, delay: Duration::ZERO },
            tokio::runtime::Handle::current(),
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        let delegate: Arc<dyn EngineDelegate> = Arc::new(ChannelDelegate { tx });
        engine.open_document(Arc::downgrade(&delegate), &path, ticket(1));
        let model = match next(&mut rx).await {
            Completion::Open(_, Some(model), _) => model,
            other => panic!("Expected successful open, got: {:?}", other),
        };

        let stale = model.to_ref();
        engine.close_document(model);
        engine.render_page(stale, 0, ticket(1));

        match next(&mut rx).await {
            Completion::Render(_, id, None) => assert_eq!(id, stale.id),
            other => panic!("Expected failed render, got: {:?}", other),
        }
    }

    #[test]
    fn test_initialize_rejects_missing_resources() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let engine = ThreadedEngine::new(
            LineRasterizer { lines_per_page: 10, delay: Duration::ZERO },
            runtime.handle().clone(),
        );

        let result = engine.initialize(&EngineSettings {
            resource_dir: Some(Utf8PathBuf::from("/no/such/resources")),
            render_timeout: None,
        });

        assert!(matches!(result, Err(EngineError::MissingResources(_))));
    }

    #[test]
    fn test_margins_and_page_size_update_geometry() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let engine = ThreadedEngine::new(
            LineRasterizer { lines_per_page: 10, delay: Duration::ZERO },
            runtime.handle().clone(),
        );

        engine.set_viewport_margins(4, 6);
        engine.set_page_size(320, 200, 2.0);

        let geometry = engine.geometry();
        assert_eq!(geometry.width, 320);
        assert_eq!(geometry.margin_bottom, 6);
        assert_eq!(geometry.content_height(), 190);
        assert_eq!(geometry.scale, 2.0);
    }
}
