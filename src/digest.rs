//! Content-addressed identity for source URLs.
//!
//! Every URL is reduced to a fixed-size fingerprint that serves as the single
//! key across the whole pipeline: the artifact filename in the
//! [`crate::store::ContentStore`], the membership key in the
//! [`crate::ledger::FailureLedger`], and the dedup key at intake. MD5 keeps
//! the identifiers byte-compatible with record streams produced by earlier
//! tooling, whose `evidence` fields are MD5 hex digests of the URL.

use md5::{Digest, Md5};

/// Compute the lowercase hex digest of a source URL.
///
/// Deterministic: the same URL always yields the same 32-character string.
///
/// # Example
/// ```rust
/// let d = refharvest::digest("https://example.com/paper.pdf");
/// assert_eq!(d.len(), 32);
/// assert_eq!(d, refharvest::digest("https://example.com/paper.pdf"));
/// ```
pub fn digest(url: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}
