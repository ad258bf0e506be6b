//! Integration tests for PreviewController driving a ThreadedEngine
//!
//! These tests verify:
//! - Callbacks arrive from tokio worker threads and drive the controller
//! - Paging end to end, including failed renders
//! - Live content updates re-layout the document
//! - Render timeouts release the render gate

use camino::{Utf8Path, Utf8PathBuf};
use html_preview::engine::{DocumentRasterizer, ThreadedEngine};
use html_preview::models::{Bitmap, OpenStatus, PageGeometry, PreviewConfig};
use html_preview::preview::{PixelCanvas, PreviewController};
use html_preview::state::{PreviewEvent, PreviewPhase};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

/// One page per `<section>`; a section containing `broken` fails to render.
struct SectionRasterizer {
    delay: Duration,
}

impl DocumentRasterizer for SectionRasterizer {
    type Document = Vec<String>;

    fn parse(&self, path: &Utf8Path, _geometry: &PageGeometry) -> Result<Vec<String>, OpenStatus> {
        let text = fs::read_to_string(path).map_err(|_| OpenStatus::FileNotFound)?;
        if !text.contains("<section>") {
            return Err(OpenStatus::ParseFailed("no sections".to_string()));
        }
        Ok(text
            .split("<section>")
            .skip(1)
            .map(|section| section.to_string())
            .collect())
    }

    fn page_count(&self, sections: &Vec<String>) -> usize {
        sections.len()
    }

    fn rasterize(&self, sections: &Vec<String>, page: usize, geometry: &PageGeometry) -> Option<Bitmap> {
        std::thread::sleep(self.delay);
        let section = sections.get(page)?;
        if section.contains("broken") {
            return None;
        }
        Some(Bitmap::filled(geometry.width, geometry.height, 0xFF00_0000 | page as u32))
    }
}

struct Harness {
    _temp_dir: TempDir,
    dir: Utf8PathBuf,
    controller: Arc<PreviewController>,
    events: broadcast::Receiver<PreviewEvent>,
}

impl Harness {
    fn new(delay: Duration, render_timeout_ms: u64) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();

        let engine = ThreadedEngine::new(
            SectionRasterizer { delay },
            tokio::runtime::Handle::current(),
        );
        let config = PreviewConfig {
            initial_width: 32,
            initial_height: 24,
            render_timeout_ms,
            ..PreviewConfig::default()
        };
        let controller = PreviewController::new(Arc::new(engine), config).unwrap();
        let events = controller.subscribe();

        Self {
            _temp_dir: temp_dir,
            dir,
            controller,
            events,
        }
    }

    fn write_source(&self, body: &str) -> Utf8PathBuf {
        let path = self.dir.join("doc.html");
        fs::write(&path, body).unwrap();
        path
    }

    /// Wait for the next event matching `want`, skipping others.
    async fn wait_for(&mut self, want: impl Fn(&PreviewEvent) -> bool) -> PreviewEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = self.events.recv().await.expect("event channel closed");
                if want(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("Timeout waiting for preview event")
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_open_and_page_through_document() {
    let mut h = Harness::new(Duration::ZERO, 0);
    let source = h.write_source("<section>one<section>two<section>three");

    h.controller.open(&source);

    let opened = h
        .wait_for(|e| matches!(e, PreviewEvent::DocumentOpened { .. }))
        .await;
    assert!(matches!(opened, PreviewEvent::DocumentOpened { page_count: 3, .. }));
    h.wait_for(|e| *e == PreviewEvent::RepaintRequested { page: 0 })
        .await;

    assert_eq!(h.controller.phase(), PreviewPhase::Ready);
    let frame = h.controller.current_frame().unwrap();
    assert_eq!((frame.width(), frame.height()), (32, 24));

    assert!(h.controller.handle_primary_advance());
    h.wait_for(|e| *e == PreviewEvent::RepaintRequested { page: 1 })
        .await;
    assert_eq!(h.controller.committed_page(), 1);

    let mut canvas = PixelCanvas::new(16, 12);
    assert!(h.controller.paint(&mut canvas, 16, 12));
    assert_eq!(canvas.pixel(0, 0), Some(0xFF00_0001));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_broken_page_reverts() {
    let mut h = Harness::new(Duration::ZERO, 0);
    let source = h.write_source("<section>fine<section>broken");

    h.controller.open(&source);
    h.wait_for(|e| *e == PreviewEvent::RepaintRequested { page: 0 })
        .await;

    assert!(h.controller.handle_primary_advance());
    let failed = h
        .wait_for(|e| matches!(e, PreviewEvent::RenderFailed { .. }))
        .await;

    assert_eq!(
        failed,
        PreviewEvent::RenderFailed {
            requested: 1,
            reverted_to: 0
        }
    );
    assert_eq!(h.controller.page_index(), 0);
    assert!(!h.controller.is_rendering());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unparseable_document_reports_open_failure() {
    let mut h = Harness::new(Duration::ZERO, 0);
    let source = h.write_source("<p>no sections here</p>");

    h.controller.open(&source);

    let failed = h
        .wait_for(|e| matches!(e, PreviewEvent::OpenFailed { .. }))
        .await;
    match failed {
        PreviewEvent::OpenFailed { path, status } => {
            assert_eq!(path, h.dir.join("__Temp__doc.html"));
            assert!(matches!(status, OpenStatus::ParseFailed(_)));
        }
        other => panic!("Expected OpenFailed, got: {:?}", other),
    }
    assert_eq!(h.controller.phase(), PreviewPhase::Closed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_update_content_relayouts() {
    let mut h = Harness::new(Duration::ZERO, 0);
    let source = h.write_source("<section>a");

    h.controller.open(&source);
    h.wait_for(|e| *e == PreviewEvent::RepaintRequested { page: 0 })
        .await;

    h.controller
        .update_content("<section>a<section>b<section>c<section>d");

    let reopened = h
        .wait_for(|e| matches!(e, PreviewEvent::DocumentOpened { .. }))
        .await;
    assert!(matches!(reopened, PreviewEvent::DocumentOpened { page_count: 4, .. }));
    assert_eq!(fs::read_to_string(&source).unwrap(), "<section>a");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_render_timeout_releases_gate() {
    let mut h = Harness::new(Duration::from_millis(500), 20);
    let source = h.write_source("<section>slow");

    h.controller.open(&source);
    h.wait_for(|e| matches!(e, PreviewEvent::RenderFailed { .. }))
        .await;

    assert!(!h.controller.is_rendering());
    assert_eq!(h.controller.current_frame(), None);
    assert_eq!(h.controller.phase(), PreviewPhase::Ready);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_resize_changes_next_frame() {
    let mut h = Harness::new(Duration::ZERO, 0);
    let source = h.write_source("<section>one<section>two");

    h.controller.open(&source);
    h.wait_for(|e| *e == PreviewEvent::RepaintRequested { page: 0 })
        .await;

    h.controller.resize(64, 48);
    h.controller.handle_primary_advance();
    h.wait_for(|e| *e == PreviewEvent::RepaintRequested { page: 1 })
        .await;

    let frame = h.controller.current_frame().unwrap();
    assert_eq!((frame.width(), frame.height()), (64, 48));
}
