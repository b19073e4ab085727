//! Per-link retrieval state machine.
//!
//! ```text
//! LedgerCheck → StoreCheck → Probing → Fetching → Staging → Converting
//! ```
//!
//! The two checks run before any resource acquisition: a ledger hit costs a
//! set lookup, a store hit costs one `stat`. A single fetch-pool slot covers
//! the probe and the full retrieval; the file-handle slot is taken when the
//! body starts streaming to disk and is still held while waiting for a
//! conversion slot. Permits are RAII, so every failure path releases them,
//! and the staged temp file is removed on every exit from this function.
//!
//! Failure classification is asymmetric by design: the probe's verdict is
//! final for a digest (transport errors included), while fetch-stage
//! failures are transient and retried by a future run. See
//! [`crate::error::ItemError::class`].

use crate::config::PipelineConfig;
use crate::error::{ItemError, ResponseRejection};
use crate::governor::ResourceGovernor;
use crate::ledger::FailureLedger;
use crate::pipeline::convert::Converter;
use crate::pipeline::intake::WorkItem;
use crate::store::ContentStore;
use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Terminal success states of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Retrieved, converted, and published this run.
    Converted,
    /// Artifact already existed; no network activity performed.
    AlreadyStored,
}

/// Shared services driving one item at a time through the state machine.
///
/// Cheap to clone; every field is a handle.
#[derive(Clone)]
pub struct Retriever {
    config: Arc<PipelineConfig>,
    client: reqwest::Client,
    ledger: Arc<FailureLedger>,
    store: ContentStore,
    governor: Arc<ResourceGovernor>,
    converter: Converter,
    shutdown: CancellationToken,
}

impl Retriever {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<PipelineConfig>,
        client: reqwest::Client,
        ledger: Arc<FailureLedger>,
        store: ContentStore,
        governor: Arc<ResourceGovernor>,
        converter: Converter,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            client,
            ledger,
            store,
            governor,
            converter,
            shutdown,
        }
    }

    /// Run one work item to a terminal state.
    pub async fn process(&self, item: &WorkItem) -> Result<Outcome, ItemError> {
        let digest = item.identifier.as_str();

        // ── LedgerCheck ──────────────────────────────────────────────────
        if self.ledger.contains(digest) {
            debug!(url = %item.url, "skipping: digest in failure ledger");
            return Err(ItemError::KnownBad);
        }

        // ── StoreCheck ───────────────────────────────────────────────────
        if self.store.exists(digest).await {
            debug!(url = %item.url, "skipping: artifact already stored");
            return Ok(Outcome::AlreadyStored);
        }

        // ── Probing ──────────────────────────────────────────────────────
        // One network slot covers the probe and the fetch that follows.
        let fetch_permit = self.governor.acquire_fetch(&self.shutdown).await?;

        let probe = self
            .client
            .head(&item.url)
            .timeout(self.config.probe_timeout)
            .send()
            .await
            .map_err(|e| ItemError::ProbeTransport {
                reason: e.to_string(),
            })?;

        validate_parts(
            probe.status().as_u16(),
            declared_content_type(&probe).as_deref(),
            declared_content_length(&probe),
            &self.config,
        )
        .map_err(ItemError::ProbeRejected)?;

        // ── Fetching ─────────────────────────────────────────────────────
        info!(url = %item.url, "downloading");

        let response = self
            .client
            .get(&item.url)
            .timeout(self.config.fetch_timeout)
            .send()
            .await
            .map_err(|e| ItemError::FetchTransport {
                reason: e.to_string(),
                timed_out: e.is_timeout(),
            })?;

        // HEAD and GET may answer differently; re-check before committing
        // disk and converter resources.
        validate_parts(
            response.status().as_u16(),
            declared_content_type(&response).as_deref(),
            declared_content_length(&response),
            &self.config,
        )
        .map_err(ItemError::FetchRejected)?;

        // ── Staging ──────────────────────────────────────────────────────
        let _file_permit = self.governor.acquire_file(&self.shutdown).await?;

        let staged = tempfile::NamedTempFile::new()
            .map_err(|e| ItemError::Staging {
                reason: e.to_string(),
            })?
            .into_temp_path();

        let mut staging_file =
            tokio::fs::File::create(&staged)
                .await
                .map_err(|e| ItemError::Staging {
                    reason: e.to_string(),
                })?;

        let mut streamed: u64 = 0;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| ItemError::FetchTransport {
                reason: e.to_string(),
                timed_out: e.is_timeout(),
            })?;

            streamed += chunk.len() as u64;
            if streamed > self.config.max_content_length {
                return Err(ItemError::FetchRejected(ResponseRejection::TooLarge {
                    declared: streamed,
                    limit: self.config.max_content_length,
                }));
            }

            staging_file
                .write_all(&chunk)
                .await
                .map_err(|e| ItemError::Staging {
                    reason: e.to_string(),
                })?;
        }
        staging_file
            .flush()
            .await
            .map_err(|e| ItemError::Staging {
                reason: e.to_string(),
            })?;
        drop(staging_file);

        // The network phase is over; free the slot before the converter
        // queue, which can be long.
        drop(fetch_permit);

        // ── Converting ───────────────────────────────────────────────────
        let _convert_permit = self.governor.acquire_convert(&self.shutdown).await?;

        let part = self.store.staging_path(digest);
        self.converter.convert(&staged, &part).await?;

        self.store
            .publish(digest)
            .await
            .map_err(|e| ItemError::Staging {
                reason: format!("publishing artifact: {e}"),
            })?;

        info!(url = %item.url, bytes = streamed, "converted");
        Ok(Outcome::Converted)
        // `staged` (TempPath) drops here, removing the temp file.
    }
}

fn declared_content_type(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

/// Content-Length as declared in the header.
///
/// Parsed by hand rather than via `Response::content_length`, which reports
/// the body size hint and is always zero for a HEAD response.
fn declared_content_length(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Validate a response's metadata against the configured acceptance rules.
///
/// Applied identically to the probe and the full fetch; only the caller's
/// classification of a rejection differs.
fn validate_parts(
    status: u16,
    content_type: Option<&str>,
    declared_len: Option<u64>,
    config: &PipelineConfig,
) -> Result<(), ResponseRejection> {
    if !(200..=298).contains(&status) {
        return Err(ResponseRejection::Status(status));
    }

    // Compare the bare MIME type: parameters stripped, case-insensitive.
    let bare = content_type.map(|ct| ct.split(';').next().unwrap_or(ct).trim());
    let accepted = bare.is_some_and(|ct| {
        config
            .accepted_content_types
            .iter()
            .any(|a| a.eq_ignore_ascii_case(ct))
    });
    if !accepted {
        return Err(ResponseRejection::ContentType(
            content_type.map(str::to_owned),
        ));
    }

    if let Some(declared) = declared_len {
        if declared > config.max_content_length {
            return Err(ResponseRejection::TooLarge {
                declared,
                limit: config.max_content_length,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PipelineConfig {
        PipelineConfig::default()
    }

    #[test]
    fn accepts_pdf_in_success_range() {
        let c = config();
        assert!(validate_parts(200, Some("application/pdf"), Some(1024), &c).is_ok());
        assert!(validate_parts(298, Some("x-pdf"), None, &c).is_ok());
    }

    #[test]
    fn rejects_status_outside_200_to_298() {
        let c = config();
        assert_eq!(
            validate_parts(404, Some("application/pdf"), None, &c),
            Err(ResponseRejection::Status(404))
        );
        assert_eq!(
            validate_parts(299, Some("application/pdf"), None, &c),
            Err(ResponseRejection::Status(299))
        );
        assert_eq!(
            validate_parts(199, Some("application/pdf"), None, &c),
            Err(ResponseRejection::Status(199))
        );
    }

    #[test]
    fn rejects_html_and_missing_content_type() {
        let c = config();
        assert_eq!(
            validate_parts(200, Some("text/html"), None, &c),
            Err(ResponseRejection::ContentType(Some("text/html".into())))
        );
        assert_eq!(
            validate_parts(200, None, None, &c),
            Err(ResponseRejection::ContentType(None))
        );
    }

    #[test]
    fn content_type_comparison_is_case_insensitive_and_ignores_params() {
        let c = config();
        assert!(validate_parts(200, Some("Application/PDF"), None, &c).is_ok());
        assert!(validate_parts(200, Some("application/pdf; charset=binary"), None, &c).is_ok());
    }

    #[test]
    fn rejects_oversize_declared_length_without_body() {
        let c = config();
        assert_eq!(
            validate_parts(200, Some("application/pdf"), Some(200_000_000), &c),
            Err(ResponseRejection::TooLarge {
                declared: 200_000_000,
                limit: 100_000_000
            })
        );
        // Absent length hint is accepted; the streaming cap still applies.
        assert!(validate_parts(200, Some("application/pdf"), None, &c).is_ok());
    }
}
