//! Persistent set of permanently-failed digests.
//!
//! The ledger is the run's only piece of shared mutable state besides the
//! pool counters. All mutation goes through this type's own synchronized
//! interface; the underlying set is never exposed.
//!
//! On disk the ledger is flat text, one digest per line, UTF-8, unordered.
//! A missing file at startup is an empty ledger (and the file is created so
//! a later flush never surprises the operator with a new path). Each flush
//! writes a point-in-time snapshot to `<path>.tmp` and renames it over the
//! ledger, so an interrupted or repeated flush leaves either the old or the
//! new complete file — never a torn one. Flush failures are logged and do
//! not abort the run; the in-memory set stays authoritative.

use crate::error::HarvestError;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// In-memory failure set mirrored to a flat file.
#[derive(Debug)]
pub struct FailureLedger {
    path: PathBuf,
    entries: Mutex<HashSet<String>>,
}

impl FailureLedger {
    /// Load the ledger from `path`, creating an empty file if none exists.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, HarvestError> {
        let path = path.into();

        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_owned)
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tokio::fs::write(&path, b"").await.map_err(|source| {
                    HarvestError::LedgerUnreadable {
                        path: path.clone(),
                        source,
                    }
                })?;
                HashSet::new()
            }
            Err(source) => {
                return Err(HarvestError::LedgerUnreadable { path, source });
            }
        };

        debug!(entries = entries.len(), path = %path.display(), "ledger loaded");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Whether a digest has been recorded as permanently failed.
    pub fn contains(&self, digest: &str) -> bool {
        self.entries.lock().unwrap().contains(digest)
    }

    /// Record a digest as permanently failed. Idempotent.
    pub fn mark_failed(&self, digest: &str) {
        self.entries.lock().unwrap().insert(digest.to_owned());
    }

    /// Number of recorded digests.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    /// Point-in-time copy of the set, taken under the same lock used for
    /// mutation, so a concurrent `mark_failed` is either fully in the
    /// snapshot or lands in the next one.
    pub fn snapshot(&self) -> Vec<String> {
        self.entries.lock().unwrap().iter().cloned().collect()
    }

    /// Write the current snapshot to disk via temp-file-and-rename.
    pub async fn flush(&self) -> std::io::Result<()> {
        let snapshot = self.snapshot();

        let mut contents = String::with_capacity(snapshot.len() * 33);
        for digest in &snapshot {
            contents.push_str(digest);
            contents.push('\n');
        }

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(entries = snapshot.len(), "ledger flushed");
        Ok(())
    }

    /// Flush on a fixed interval until `stop` fires.
    ///
    /// The caller performs the final flush itself after draining in-flight
    /// work, so this task can simply stop when asked.
    pub async fn run_flusher(&self, interval: Duration, stop: CancellationToken) {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick of a tokio interval fires immediately; skip it so
        // the flusher does not rewrite the file it just loaded.
        tick.tick().await;

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tick.tick() => {
                    if let Err(e) = self.flush().await {
                        warn!(error = %e, path = %self.path.display(), "ledger flush failed");
                    }
                }
            }
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
