// html-preview - asynchronous HTML page preview and pagination
//
// The library hosts the preview controller, the layout-engine contract and
// the staging, state and configuration pieces around them. Hosts embed the
// controller and drive it from their UI thread.

pub mod config;
pub mod engine;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod preview;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use self::config::ConfigManager;
pub use engine::{EngineDelegate, LayoutEngine, RequestTicket, SessionKey, ThreadedEngine};
pub use models::{Bitmap, DocumentModel, OpenStatus, PreviewConfig};
pub use preview::{PointerButton, PreviewController};
pub use services::TempFileStager;
pub use state::{PreviewEvent, PreviewPhase};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
