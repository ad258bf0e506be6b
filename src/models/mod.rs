//! Data models for the preview core.
//!
//! - [`DocumentModel`] / [`DocumentRef`]: engine-owned document handles
//! - [`Bitmap`]: a rasterized page
//! - [`PageCursor`]: speculative page index with commit/revert
//! - [`PreviewConfig`]: settings loaded by [`ConfigManager`](crate::config::ConfigManager)

pub mod config;
pub mod cursor;
pub mod document;
pub mod frame;

pub use self::config::{LoggingConfig, PreviewConfig};
pub use cursor::PageCursor;
pub use document::{DocumentId, DocumentModel, DocumentRef, OpenStatus, PageGeometry, Viewport};
pub use frame::Bitmap;
