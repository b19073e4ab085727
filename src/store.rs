//! Content store: the on-disk mapping from digest to converted artifact.
//!
//! Existence of `<root>/<digest>.txt` is the single source of truth for
//! "already successfully processed". The file appears only via
//! [`ContentStore::publish`], which renames a fully-written staging file into
//! place — a reader can never observe a partially-written artifact.
//!
//! No locking: within one run the conversion step is the unique producer for
//! a given digest (intake dedups admissions), and concurrent runs against
//! the same store are not supported.

use crate::error::HarvestError;
use std::path::{Path, PathBuf};

/// Handle to the artifact directory.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    /// Open the store, creating the artifact directory on demand.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, HarvestError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|source| HarvestError::OutputDirUnavailable {
                path: root.clone(),
                source,
            })?;
        Ok(Self { root })
    }

    /// Final artifact path for a digest: `<root>/<digest>.txt`.
    pub fn final_path(&self, digest: &str) -> PathBuf {
        self.root.join(format!("{digest}.txt"))
    }

    /// Working path the converter writes before publication.
    pub fn staging_path(&self, digest: &str) -> PathBuf {
        self.root.join(format!("{digest}.txt.part"))
    }

    /// Whether the artifact for this digest already exists.
    pub async fn exists(&self, digest: &str) -> bool {
        tokio::fs::try_exists(self.final_path(digest))
            .await
            .unwrap_or(false)
    }

    /// Atomically promote a finished staging file to the final path.
    pub async fn publish(&self, digest: &str) -> std::io::Result<()> {
        tokio::fs::rename(self.staging_path(digest), self.final_path(digest)).await
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }
}
