// src/source/mod.rs
use crate::utils::error::SourceError;
use std::path::{Path, PathBuf};

/// Supplies raw markup for a source identifier. Parsing happens in the caller.
pub trait DocumentProvider: Send + Sync {
    fn fetch(&self, source: &str) -> Result<String, SourceError>;
}

/// Reads previously saved pages from disk, relative to `root` unless absolute.
pub struct FileProvider {
    root: PathBuf,
}

impl FileProvider {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    fn resolve(&self, source: &str) -> PathBuf {
        let path = Path::new(source);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl DocumentProvider for FileProvider {
    fn fetch(&self, source: &str) -> Result<String, SourceError> {
        let path = self.resolve(source);
        if !path.exists() {
            tracing::warn!("Source not found: {}", path.display());
            return Err(SourceError::NotFound(path.display().to_string()));
        }

        let body = std::fs::read_to_string(&path).map_err(|e| SourceError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        if body.trim().is_empty() {
            return Err(SourceError::Empty(path.display().to_string()));
        }

        tracing::debug!("Read {} bytes from {}", body.len(), path.display());
        Ok(body)
    }
}
