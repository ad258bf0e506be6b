use std::sync::{Arc, PoisonError, RwLock};

/// Thread-safe flag that is set exactly while a page render is in flight.
///
/// Input handling checks the gate and drops navigation while it is set, so
/// page-advance requests never queue up behind a slow render. The lock is
/// held only for the read or write itself, never across an engine call.
#[derive(Debug, Clone, Default)]
pub struct RenderGate {
    rendering: Arc<RwLock<bool>>,
}

impl RenderGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rendering(&self, rendering: bool) {
        *self.rendering.write().unwrap_or_else(PoisonError::into_inner) = rendering;
    }

    pub fn is_rendering(&self) -> bool {
        *self.rendering.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the gate if it is clear.
    ///
    /// Returns `false` without changing anything when a render is already in
    /// flight. Check and set happen under one write lock.
    pub fn try_begin(&self) -> bool {
        let mut rendering = self.rendering.write().unwrap_or_else(PoisonError::into_inner);
        if *rendering {
            return false;
        }
        *rendering = true;
        true
    }
}
