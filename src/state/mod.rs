// State module
//
// Shared state touched by both the host thread and the engine's worker threads.
// Each guarded value has its own lock; nothing here holds a lock across an
// engine call.

pub mod gate;
pub mod registry;

pub use gate::RenderGate;
pub use registry::ModelRegistry;

use crate::models::{DocumentId, OpenStatus};
use camino::Utf8PathBuf;
use tokio::sync::broadcast;

/// Lifecycle phase of a preview session
///
/// `Opening` and `Paginating` fall back to the previous stable phase
/// (`Ready` or `Closed`) when the engine reports a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewPhase {
    Closed,
    Opening,
    Ready,
    Paginating,
}

impl PreviewPhase {
    pub fn is_stable(&self) -> bool {
        matches!(self, PreviewPhase::Closed | PreviewPhase::Ready)
    }
}

/// Notifications emitted to the host
///
/// These are what a UI listens to instead of polling the controller: a
/// repaint request after a successful render, and failure reports that would
/// otherwise only reach the log.
#[derive(Clone, Debug, PartialEq)]
pub enum PreviewEvent {
    /// The engine accepted a document
    DocumentOpened {
        document: DocumentId,
        page_count: usize,
    },

    /// The engine could not open a document; prior state was kept
    OpenFailed {
        path: Utf8PathBuf,
        status: OpenStatus,
    },

    /// A new frame is available and should be painted
    RepaintRequested {
        page: usize,
    },

    /// A render produced no bitmap; the page index was rolled back
    RenderFailed {
        requested: usize,
        reverted_to: usize,
    },

    /// A callback for a superseded request arrived and was ignored
    StaleCallbackDropped,

    /// The session was closed and its resources released
    Closed,
}

/// Broadcast channel for [`PreviewEvent`]s
///
/// Multiple subscribers can listen at once. Sending with no subscribers is
/// not an error.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PreviewEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PreviewEvent> {
        self.tx.subscribe()
    }

    /// Emit an event. Returns `false` when nobody is listening.
    pub fn emit(&self, event: PreviewEvent) -> bool {
        tracing::trace!("Preview event: {:?}", event);
        self.tx.send(event).is_ok()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}
