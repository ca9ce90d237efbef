// ABOUTME: Writes extracted image bytes to uniquely named files under the uploads directory
// ABOUTME: Returns the relative path that replaces the blob in the database

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Destination for extracted blobs
pub trait BlobWriter {
    /// Make sure the destination exists; must be idempotent
    fn prepare(&self) -> Result<()>;

    /// Persist `bytes` as a new file and return its path relative to the app root
    fn write_blob(&self, bytes: &[u8]) -> Result<String>;

    /// Whether `value` already names a file this writer produced
    fn is_managed_path(&self, value: &str) -> bool;
}

/// Filesystem writer producing `<uploads_dir>/<32 hex>.<ext>`
#[derive(Debug, Clone)]
pub struct FsBlobWriter {
    app_root: PathBuf,
    uploads_dir: String,
    extension: String,
}

impl FsBlobWriter {
    pub fn new(app_root: impl Into<PathBuf>, uploads_dir: &str, extension: &str) -> Self {
        Self {
            app_root: app_root.into(),
            uploads_dir: uploads_dir.trim_matches('/').to_string(),
            extension: extension.to_string(),
        }
    }

    pub fn from_config(config: &crate::config::UploadsConfig) -> Self {
        Self::new(&config.app_root, &config.dir, &config.extension)
    }

    pub fn uploads_path(&self) -> PathBuf {
        self.app_root.join(&self.uploads_dir)
    }

    /// Absolute location of a stored relative path
    pub fn resolve(&self, relative: &str) -> PathBuf {
        resolve_relative(&self.app_root, relative)
    }

    fn new_file_name(&self) -> String {
        format!("{}.{}", Uuid::new_v4().simple(), self.extension)
    }
}

/// Join a `/`-separated relative path onto `root`
pub fn resolve_relative(root: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|part| !part.is_empty())
        .fold(root.to_path_buf(), |acc, part| acc.join(part))
}

impl BlobWriter for FsBlobWriter {
    fn prepare(&self) -> Result<()> {
        let dir = self.uploads_path();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create uploads directory '{}'", dir.display()))?;
        tracing::debug!("Uploads directory ready at '{}'", dir.display());
        Ok(())
    }

    fn write_blob(&self, bytes: &[u8]) -> Result<String> {
        let file_name = self.new_file_name();
        let relative = format!("{}/{}", self.uploads_dir, file_name);
        let full_path = self.uploads_path().join(&file_name);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full_path)
            .with_context(|| format!("Failed to create '{}'", full_path.display()))?;

        let written = file
            .write_all(bytes)
            .and_then(|_| file.sync_all())
            .with_context(|| format!("Failed to write '{}'", full_path.display()));

        if let Err(e) = written {
            drop(file);
            // Never referenced, so it is safe to remove
            if let Err(rm) = fs::remove_file(&full_path) {
                tracing::warn!(
                    "Could not remove partial file '{}': {}",
                    full_path.display(),
                    rm
                );
            }
            return Err(e);
        }

        tracing::debug!("Wrote {} bytes to '{}'", bytes.len(), relative);
        Ok(relative)
    }

    fn is_managed_path(&self, value: &str) -> bool {
        value
            .strip_prefix(&self.uploads_dir)
            .and_then(|rest| rest.strip_prefix('/'))
            .is_some_and(|name| {
                !name.is_empty()
                    && !name.contains('/')
                    && name.ends_with(&format!(".{}", self.extension))
            })
    }
}
