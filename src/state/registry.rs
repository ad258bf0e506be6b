use crate::models::{DocumentId, DocumentModel, DocumentRef};
use std::sync::{Arc, PoisonError, RwLock};

/// Thread-safe holder of the one live [`DocumentModel`].
///
/// Swaps happen under the write lock, but the displaced model is handed to the
/// `close` callback only after the lock is released. The close call goes to
/// the engine, and no lock is held across an engine call.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    current: Arc<RwLock<Option<DocumentModel>>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `model`, closing whatever was registered before it.
    pub fn install<F>(&self, model: DocumentModel, close: F)
    where
        F: FnOnce(DocumentModel),
    {
        if let Some(previous) = self.replace(model) {
            tracing::debug!("Closing displaced model {}", previous.id());
            close(previous);
        }
    }

    /// Install `model` and hand back the displaced one.
    ///
    /// The caller owns closing the returned model, after releasing any lock
    /// of its own.
    pub fn replace(&self, model: DocumentModel) -> Option<DocumentModel> {
        self.current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(model)
    }

    /// Close and forget the current model, if any.
    ///
    /// Returns `true` when a model was removed.
    pub fn clear<F>(&self, close: F) -> bool
    where
        F: FnOnce(DocumentModel),
    {
        let previous = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match previous {
            Some(previous) => {
                tracing::debug!("Closing model {}", previous.id());
                close(previous);
                true
            }
            None => false,
        }
    }

    pub fn current(&self) -> Option<DocumentRef> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(DocumentModel::to_ref)
    }

    pub fn current_id(&self) -> Option<DocumentId> {
        self.current().map(|doc| doc.id)
    }

    pub fn is_loaded(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
