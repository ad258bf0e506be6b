/// Speculative page index with explicit commit and revert.
///
/// Navigation moves `pending` immediately, before the engine has rendered the
/// page. A successful render commits it; a failed render reverts it to the
/// last committed value, so a failure never advances the visible page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageCursor {
    pending: usize,
    committed: usize,
}

impl PageCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Page currently requested (possibly not yet rendered).
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Page of the most recent successful render.
    pub fn committed(&self) -> usize {
        self.committed
    }

    pub fn is_speculative(&self) -> bool {
        self.pending != self.committed
    }

    /// Move forward one page if another page exists.
    ///
    /// Returns the new pending page, or `None` when already on the last page.
    pub fn advance(&mut self, page_count: usize) -> Option<usize> {
        if self.pending + 1 >= page_count {
            return None;
        }
        self.pending += 1;
        Some(self.pending)
    }

    /// Move back one page. Returns `None` on the first page.
    pub fn retreat(&mut self) -> Option<usize> {
        if self.pending == 0 {
            return None;
        }
        self.pending -= 1;
        Some(self.pending)
    }

    pub fn commit(&mut self) {
        self.committed = self.pending;
    }

    pub fn revert(&mut self) {
        self.pending = self.committed;
    }

    /// Commit `page` as rendered. A pending page that has already moved past
    /// it stays where it is.
    pub fn commit_page(&mut self, page: usize) {
        self.committed = page;
    }

    /// Revert a failed move to `page`. Does nothing when `pending` has moved
    /// on since the render of `page` was requested.
    pub fn revert_page(&mut self, page: usize) {
        if self.pending == page {
            self.pending = self.committed;
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Keep both indices inside a document with `page_count` pages.
    pub fn clamp_to(&mut self, page_count: usize) {
        let last = page_count.saturating_sub(1);
        self.pending = self.pending.min(last);
        self.committed = self.committed.min(last);
    }
}
