#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Temporary files and directories removed on every exit path.
//!
//! Removal failures are logged and never replace the caller's own error.

use crate::Result;
use std::path::{Path, PathBuf};
use tempfile::{Builder, TempDir, TempPath};
use tracing::warn;

#[derive(Debug)]
pub struct ScratchDir {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl ScratchDir {
    /// # Errors
    /// Returns `CpiError::Io` when the directory cannot be created.
    pub fn new(prefix: &str) -> Result<Self> {
        let dir = Builder::new().prefix(prefix).tempdir()?;
        let path = dir.path().to_path_buf();
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if let Err(err) = dir.close() {
                warn!(path = %self.path.display(), error = %err, "Failed to remove temporary directory");
            }
        }
    }
}

#[derive(Debug)]
pub struct ScratchFile {
    file: Option<TempPath>,
    path: PathBuf,
}

impl ScratchFile {
    /// Reserves an empty file path with the given prefix and suffix.
    ///
    /// # Errors
    /// Returns `CpiError::Io` when the file cannot be created.
    pub fn new(prefix: &str, suffix: &str) -> Result<Self> {
        let file = Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile()?
            .into_temp_path();
        let path = file.to_path_buf();
        Ok(Self {
            file: Some(file),
            path,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(err) = file.close() {
                warn!(path = %self.path.display(), error = %err, "Failed to remove temporary file");
            }
        }
    }
}
