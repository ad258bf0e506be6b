//! Layout-engine contract.
//!
//! The engine parses a document and rasterizes pages on its own worker
//! context. Completion is reported asynchronously, possibly from another
//! thread, through an [`EngineDelegate`]. Every request carries a
//! [`RequestTicket`] which the engine echoes back unchanged, so the delegate
//! can recognise callbacks that belong to a superseded request.
//!
//! [`ThreadedEngine`] adapts any synchronous [`DocumentRasterizer`] to this
//! contract by running work on tokio's blocking pool.

pub mod threaded;

pub use threaded::{DocumentRasterizer, ThreadedEngine};

use crate::models::{Bitmap, DocumentId, DocumentModel, DocumentRef, OpenStatus};
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use std::sync::Weak;
use std::time::Duration;
use thiserror::Error;

/// Opaque tag correlating callbacks with a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one open or render request.
///
/// `generation` increases on every open, so comparing it with the
/// controller's current generation tells whether a callback is stale.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestTicket {
    pub session: SessionKey,
    pub generation: u64,
}

impl RequestTicket {
    pub fn new(session: SessionKey, generation: u64) -> Self {
        Self {
            session,
            generation,
        }
    }
}

/// Settings handed to the engine once, before any document is opened.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineSettings {
    /// Directory with engine resources (fonts, user stylesheets); empty for none
    pub resource_dir: Option<Utf8PathBuf>,
    pub render_timeout: Option<Duration>,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Engine initialization failed: {0}")]
    Initialization(String),

    #[error("Engine resources not found: {0}")]
    MissingResources(Utf8PathBuf),

    #[error("Engine has been shut down")]
    ShutDown,
}

/// Callback target for engine completions.
///
/// Implementations must be callable from any thread.
pub trait EngineDelegate: Send + Sync {
    /// An open request finished. `model` is present only when the engine
    /// managed to produce one; ownership passes to the delegate.
    fn on_open_complete(&self, ticket: RequestTicket, model: Option<DocumentModel>, status: OpenStatus);

    /// A render request finished. `bitmap` is `None` when rendering failed.
    fn on_render_complete(&self, ticket: RequestTicket, document: DocumentId, bitmap: Option<Bitmap>);
}

/// Capabilities the preview controller consumes from a layout engine.
#[cfg_attr(test, mockall::automock)]
pub trait LayoutEngine: Send + Sync {
    fn set_viewport_margins(&self, top: u32, bottom: u32);

    /// Page size used for layout and rasterization.
    fn set_page_size(&self, width: u32, height: u32, scale: f32);

    fn initialize(&self, settings: &EngineSettings) -> Result<(), EngineError>;

    /// Start opening `path`. Completion arrives via
    /// [`EngineDelegate::on_open_complete`] on `delegate`.
    fn open_document(&self, delegate: Weak<dyn EngineDelegate>, path: &Utf8Path, ticket: RequestTicket);

    /// Start rendering one page. Completion arrives via
    /// [`EngineDelegate::on_render_complete`] on the delegate that opened
    /// the document.
    fn render_page(&self, document: DocumentRef, page: usize, ticket: RequestTicket);

    fn close_document(&self, model: DocumentModel);

    /// Release engine-wide resources. Called once during teardown.
    fn shutdown(&self) {}
}
