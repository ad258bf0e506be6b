use crate::models::PreviewConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use ::config::{Config, Environment, File, FileFormat};
use std::fs;

/// File name of the preview configuration inside the config directory.
pub const CONFIG_FILE_NAME: &str = "preview.yaml";

/// Prefix of environment variables that override file settings.
pub const ENV_PREFIX: &str = "HTML_PREVIEW";

/// Configuration manager for loading and saving the preview configuration.
///
/// Settings are layered: built-in defaults, then `preview.yaml` if present,
/// then `HTML_PREVIEW_*` environment variables. Nested keys use a double
/// underscore, e.g. `HTML_PREVIEW_LOGGING__DEBUG_MODE=true`.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
    env_prefix: String,
}

impl ConfigManager {
    /// Create a new ConfigManager, creating `config_dir` if it doesn't exist.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            config_path: config_dir.join(CONFIG_FILE_NAME),
            config_dir,
            env_prefix: ENV_PREFIX.to_string(),
        })
    }

    /// Use a different environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Load the configuration.
    ///
    /// # Returns
    /// The layered PreviewConfig; defaults when neither file nor environment
    /// provide a value
    pub fn load(&self) -> Result<PreviewConfig> {
        if !self.config_path.exists() {
            tracing::warn!(
                "Preview config file not found at {}, using defaults",
                self.config_path
            );
        }

        let settings = Config::builder()
            .add_source(
                File::from(self.config_path.as_std_path())
                    .format(FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read preview config: {}", self.config_path))?;

        let config: PreviewConfig = settings
            .try_deserialize()
            .with_context(|| format!("Failed to parse preview config: {}", self.config_path))?;

        tracing::info!("Loaded preview config from {}", self.config_path);
        Ok(config)
    }

    /// Save the configuration file.
    pub fn save(&self, config: &PreviewConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize preview config to YAML")?;

        fs::write(&self.config_path, yaml_string)
            .with_context(|| format!("Failed to write preview config: {}", self.config_path))?;

        tracing::info!("Saved preview config to {}", self.config_path);
        Ok(())
    }

    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }
}
