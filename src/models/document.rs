use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;

/// Engine-assigned identifier for an opened document.
///
/// Ids are unique per open request, so a callback carrying an id that is no
/// longer registered can be recognised as belonging to a superseded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(pub u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc#{}", self.0)
    }
}

/// Opaque handle to a parsed document returned by the layout engine.
///
/// A `DocumentModel` is deliberately not `Clone`: exactly one owner exists at
/// a time (the [`ModelRegistry`](crate::state::ModelRegistry)), and the handle
/// is consumed when it is handed back to the engine for closing.
#[derive(Debug, PartialEq, Eq)]
pub struct DocumentModel {
    id: DocumentId,
    page_count: usize,
    path: Utf8PathBuf,
}

impl DocumentModel {
    pub fn new(id: DocumentId, page_count: usize, path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            id,
            page_count,
            path: path.into(),
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// Number of pages the engine laid the document out into.
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Path the engine opened (normally the staged copy).
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Lightweight reference used for render requests.
    pub fn to_ref(&self) -> DocumentRef {
        DocumentRef {
            id: self.id,
            page_count: self.page_count,
        }
    }
}

/// Copyable view of a registered document: enough to request a render and
/// bounds-check navigation without borrowing the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentRef {
    pub id: DocumentId,
    pub page_count: usize,
}

/// Status reported by the engine when an open request completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenStatus {
    Success,
    FileNotFound,
    ParseFailed(String),
    Unsupported,
    Cancelled,
}

impl OpenStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, OpenStatus::Success)
    }
}

impl fmt::Display for OpenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenStatus::Success => write!(f, "success"),
            OpenStatus::FileNotFound => write!(f, "file not found"),
            OpenStatus::ParseFailed(reason) => write!(f, "parse failed: {}", reason),
            OpenStatus::Unsupported => write!(f, "unsupported document"),
            OpenStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Viewport size in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Page geometry the engine lays pages out against.
///
/// The engine captures this at open time, so it has to be re-applied before
/// every open and after every resize.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: u32,
    pub height: u32,
    pub margin_top: u32,
    pub margin_bottom: u32,
    pub scale: f32,
}

impl PageGeometry {
    /// Height left for content once the vertical margins are removed.
    pub fn content_height(&self) -> u32 {
        self.height
            .saturating_sub(self.margin_top)
            .saturating_sub(self.margin_bottom)
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            margin_top: 0,
            margin_bottom: 0,
            scale: 1.0,
        }
    }
}
