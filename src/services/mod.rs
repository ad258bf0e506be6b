//! Services module - filesystem work backing the preview controller.
//!
//! # Components
//!
//! - [`TempFileStager`]: derives the staged-copy path for a source document,
//!   copies the source there, overwrites it for live edits, and purges stale
//!   copies. The engine only ever opens the staged copy, so edits made through
//!   [`PreviewController::update_content`](crate::preview::PreviewController::update_content)
//!   never reach the original file.
//!
//! The stager holds no state beyond its marker prefix and has no knowledge of
//! the engine or the UI, which keeps it testable against a plain temp dir.

pub mod staging;

pub use staging::{DEFAULT_TEMP_PREFIX, StageMode, StageOutcome, StagingError, TempFileStager};
