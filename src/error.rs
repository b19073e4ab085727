//! Error types for the refharvest library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`HarvestError`] — **Fatal**: the run cannot proceed at all (unreadable
//!   input, unwritable output directory, no converter for this platform).
//!   Returned as `Err(HarvestError)` from [`crate::run::run`] before any
//!   work item is admitted.
//!
//! * [`ItemError`] — **Non-fatal**: one work item failed, the rest of the
//!   run continues. Its [`FailureClass`] decides whether the digest is
//!   written into the failure ledger (permanent) or left for a future run
//!   to retry (transient).
//!
//! Process termination is reserved for configuration-time errors; everything
//! that happens after the first item is admitted flows back as a typed value.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the refharvest library.
///
/// Per-item failures use [`ItemError`] and are folded into the run report
/// rather than propagated here.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// No converter binary is known for the current platform and none was
    /// supplied in the configuration.
    #[error("no converter available for platform '{os}'\nSupply one with --converter <PATH>.")]
    UnsupportedPlatform { os: String },

    /// The input index/record file could not be opened.
    #[error("failed to read input '{path}': {source}")]
    InputUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The output directory could not be created.
    #[error("failed to create output directory '{path}': {source}")]
    OutputDirUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The ledger file exists but could not be read.
    #[error("failed to load ledger '{path}': {source}")]
    LedgerUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line of the input stream is not a valid record.
    #[error("malformed input record on line {line}: {reason}")]
    InvalidRecord { line: u64, reason: String },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(reqwest::Error),

    /// Builder validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Why an HTTP response was refused during validation.
///
/// Produced by both the probe and the defensive re-check on the full fetch;
/// the two sites classify it differently (see [`ItemError::class`]).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseRejection {
    /// Status outside the accepted 200–298 range.
    #[error("status {0}")]
    Status(u16),

    /// Declared MIME type (or its absence) is not in the accepted set.
    #[error("content-type {0:?}")]
    ContentType(Option<String>),

    /// Declared Content-Length exceeds the configured maximum.
    #[error("declared length {declared} exceeds limit {limit}")]
    TooLarge { declared: u64, limit: u64 },
}

/// A non-fatal failure for a single work item.
///
/// The run records the item as failed and moves on; only
/// [`FailureClass::Permanent`] errors reach the ledger.
#[derive(Debug, Clone, Error)]
pub enum ItemError {
    /// Digest already present in the failure ledger; skipped without I/O.
    #[error("digest is in the failure ledger")]
    KnownBad,

    /// The metadata probe could not be completed.
    #[error("probe request failed: {reason}")]
    ProbeTransport { reason: String },

    /// The probe response failed validation.
    #[error("probe rejected: {0}")]
    ProbeRejected(ResponseRejection),

    /// The full fetch or its body stream failed.
    #[error("fetch failed: {reason}")]
    FetchTransport { reason: String, timed_out: bool },

    /// The fetch response failed the defensive re-validation.
    #[error("fetch rejected: {0}")]
    FetchRejected(ResponseRejection),

    /// Writing the staged copy to local disk failed.
    #[error("staging failed: {reason}")]
    Staging { reason: String },

    /// The external converter exited nonzero or produced no output.
    #[error("conversion failed: {diagnostic}")]
    Conversion { diagnostic: String },

    /// A pool acquisition was aborted by the shutdown signal.
    #[error("cancelled by shutdown")]
    Cancelled,
}

/// How a failed item is treated for the rest of this run and the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Recorded in the ledger; future runs skip the digest without network.
    Permanent,
    /// Counted against this run only; a future run retries the item.
    Transient,
    /// Interrupted by shutdown; neither counted nor recorded.
    Cancelled,
}

impl ItemError {
    /// Classify this failure.
    ///
    /// The probe/fetch asymmetry is deliberate and mirrors the run-level
    /// retry policy: everything the probe decides is final for the digest,
    /// everything after it is local or transient and stays out of the
    /// ledger — except conversion, which proves the fetched bytes
    /// themselves are unusable.
    pub fn class(&self) -> FailureClass {
        match self {
            ItemError::KnownBad
            | ItemError::ProbeTransport { .. }
            | ItemError::ProbeRejected(_)
            | ItemError::Conversion { .. } => FailureClass::Permanent,

            ItemError::FetchTransport { .. }
            | ItemError::FetchRejected(_)
            | ItemError::Staging { .. } => FailureClass::Transient,

            ItemError::Cancelled => FailureClass::Cancelled,
        }
    }
}
