use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use thiserror::Error;

/// Marker prepended to staged copies unless configured otherwise.
pub const DEFAULT_TEMP_PREFIX: &str = "__Temp__";

/// Errors that can occur while staging a document
#[derive(Error, Debug)]
pub enum StagingError {
    #[error("Source path is empty")]
    EmptySourcePath,

    #[error("Path has no file name: {0}")]
    NoFileName(Utf8PathBuf),

    #[error("Refusing to write a file without the staging marker: {0}")]
    NotStaged(Utf8PathBuf),

    #[error("Current directory is not valid UTF-8")]
    NonUtf8CurrentDir,

    #[error("I/O error on {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StagingError {
    fn io(path: &Utf8Path, source: std::io::Error) -> Self {
        StagingError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Whether an existing staged copy may be replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageMode {
    KeepExisting,
    Overwrite,
}

/// What `stage` actually did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// The source was copied to the staged path
    Copied(Utf8PathBuf),
    /// A staged copy already existed and was left alone
    AlreadyStaged(Utf8PathBuf),
    /// The source does not exist; the staged path is still returned so the
    /// engine can be pointed at it and report the failure itself
    SourceMissing(Utf8PathBuf),
}

impl StageOutcome {
    pub fn staged_path(&self) -> &Utf8Path {
        match self {
            StageOutcome::Copied(path)
            | StageOutcome::AlreadyStaged(path)
            | StageOutcome::SourceMissing(path) => path,
        }
    }
}

/// Maintains sandboxed working copies of source documents.
///
/// The staged copy lives next to the source, named with a reserved marker
/// prefix, so live edits never touch the original file. Only files carrying
/// the marker are ever written or removed.
#[derive(Debug, Clone)]
pub struct TempFileStager {
    prefix: String,
}

impl TempFileStager {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Derive the staged-copy path for `original`.
    ///
    /// Returns `None` when `original` is empty or names no file. Relative
    /// paths are resolved against the current directory.
    pub fn derive_path(&self, original: &Utf8Path) -> Option<Utf8PathBuf> {
        self.try_derive_path(original).ok()
    }

    fn try_derive_path(&self, original: &Utf8Path) -> Result<Utf8PathBuf, StagingError> {
        if original.as_str().is_empty() {
            return Err(StagingError::EmptySourcePath);
        }

        let file_name = original
            .file_name()
            .ok_or_else(|| StagingError::NoFileName(original.to_path_buf()))?;

        let parent = original.parent().unwrap_or_else(|| Utf8Path::new(""));
        let dir = if parent.is_absolute() {
            parent.to_path_buf()
        } else {
            let cwd = std::env::current_dir().map_err(|e| StagingError::io(parent, e))?;
            let cwd = Utf8PathBuf::try_from(cwd).map_err(|_| StagingError::NonUtf8CurrentDir)?;
            cwd.join(parent)
        };

        Ok(dir.join(format!("{}{}", self.prefix, file_name)))
    }

    /// Copy `original` to its staged path.
    ///
    /// With [`StageMode::KeepExisting`] an existing staged copy is never
    /// overwritten, which makes repeated opens idempotent.
    pub fn stage(&self, original: &Utf8Path, mode: StageMode) -> Result<StageOutcome, StagingError> {
        let staged = self.try_derive_path(original)?;

        if !original.is_file() {
            tracing::warn!("Source document not found: {}", original);
            return Ok(StageOutcome::SourceMissing(staged));
        }

        if staged.exists() && mode == StageMode::KeepExisting {
            tracing::debug!("Staged copy already present: {}", staged);
            return Ok(StageOutcome::AlreadyStaged(staged));
        }

        fs::copy(original, &staged).map_err(|e| StagingError::io(&staged, e))?;
        tracing::debug!("Staged {} -> {}", original, staged);

        Ok(StageOutcome::Copied(staged))
    }

    /// Replace the full content of a staged copy with `text` (UTF-8).
    ///
    /// Refuses to write anything that does not carry the marker prefix.
    pub fn write_content(&self, staged: &Utf8Path, text: &str) -> Result<(), StagingError> {
        if !self.is_staged_name(staged) {
            return Err(StagingError::NotStaged(staged.to_path_buf()));
        }

        fs::write(staged, text.as_bytes()).map_err(|e| StagingError::io(staged, e))?;
        tracing::debug!("Wrote {} bytes to staged copy {}", text.len(), staged);

        Ok(())
    }

    /// Remove every staged copy in `directory`.
    ///
    /// Only regular files (not symlinks) whose name starts with the marker
    /// are removed. Returns the number of files deleted.
    pub fn purge_stale(&self, directory: &Utf8Path) -> Result<usize, StagingError> {
        let entries = directory
            .read_dir_utf8()
            .map_err(|e| StagingError::io(directory, e))?;

        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|e| StagingError::io(directory, e))?;
            let file_type = entry
                .file_type()
                .map_err(|e| StagingError::io(entry.path(), e))?;

            if !file_type.is_file() || !entry.file_name().starts_with(&self.prefix) {
                continue;
            }

            fs::remove_file(entry.path()).map_err(|e| StagingError::io(entry.path(), e))?;
            tracing::debug!("Removed stale staged copy: {}", entry.path());
            removed += 1;
        }

        if removed > 0 {
            tracing::info!("Purged {} stale staged copies from {}", removed, directory);
        }

        Ok(removed)
    }

    fn is_staged_name(&self, path: &Utf8Path) -> bool {
        path.file_name()
            .map(|name| name.starts_with(&self.prefix))
            .unwrap_or(false)
    }
}

impl Default for TempFileStager {
    fn default() -> Self {
        Self::new(DEFAULT_TEMP_PREFIX)
    }
}
