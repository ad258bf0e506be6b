use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Preview configuration loaded from `preview.yaml` and `HTML_PREVIEW_*` variables.
///
/// Every field has a default, so partial files and empty environments are fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Marker prepended to a source file name to form its staged copy.
    pub temp_prefix: String,

    /// Session key attached to every open request.
    pub session_key: String,

    pub margin_top: u32,
    pub margin_bottom: u32,
    pub scale: f32,

    /// Viewport used until the host reports its real size.
    pub initial_width: u32,
    pub initial_height: u32,

    /// Upper bound on a single page render; 0 disables the timeout.
    pub render_timeout_ms: u64,

    /// Buffer size of the preview event broadcast channel.
    pub event_capacity: usize,

    /// Overwrite an existing staged copy when a reload is forced.
    pub restage_on_forced_reload: bool,

    /// Engine resource directory (fonts, user stylesheets).
    pub resource_dir: Option<String>,

    pub logging: LoggingConfig,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            temp_prefix: "__Temp__".to_string(),
            session_key: "html_id_key".to_string(),
            margin_top: 0,
            margin_bottom: 0,
            scale: 1.0,
            initial_width: 800,
            initial_height: 600,
            render_timeout_ms: 10_000,
            event_capacity: 100,
            restage_on_forced_reload: false,
            resource_dir: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl PreviewConfig {
    pub fn render_timeout(&self) -> Option<Duration> {
        if self.render_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.render_timeout_ms))
        }
    }
}

/// Logging settings consumed by [`crate::logging::init_logging`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_dir: String,
    pub log_prefix: String,
    pub debug_mode: bool,
    pub console_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".to_string(),
            log_prefix: "html-preview".to_string(),
            debug_mode: false,
            console_output: false,
        }
    }
}
