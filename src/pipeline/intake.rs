//! Work intake: map input lines to `(identifier, URL)` work items.
//!
//! Two source shapes are supported, both consumed lazily one line at a time
//! so a multi-hundred-thousand-link input never sits in memory:
//!
//! * **JSONL** — one object per line with explicit `url` and `evidence`
//!   fields. The evidence filename carries the expected identifier; when it
//!   disagrees with the digest recomputed from the URL we warn and trust the
//!   supplied identifier, so the artifact lands where the record says it
//!   will.
//! * **Article index** — one record filename per line, each naming a JSON
//!   article record whose sentences carry nested link lists. Every link
//!   becomes a work item keyed by the digest of its URL.

use crate::config::{IntakeFormat, PipelineConfig};
use crate::digest::digest;
use crate::error::HarvestError;
use futures::StreamExt;
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tracing::warn;

/// One unit of work: an identifier and the URL it came from.
///
/// Born at intake, consumed exactly once per run attempt, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Ledger/store key; normally `digest(url)`.
    pub identifier: String,
    /// Source to retrieve.
    pub url: String,
}

/// One line of a JSONL record stream.
#[derive(Debug, Deserialize)]
struct EvidenceRecord {
    url: String,
    evidence: String,
}

/// One sentence of an article record. Fields other than `links` are
/// irrelevant to retrieval and ignored.
#[derive(Debug, Deserialize)]
struct SentenceRecord {
    links: Vec<String>,
}

/// A per-article structured record.
#[derive(Debug, Deserialize)]
struct ArticleRecord {
    sentences: Vec<SentenceRecord>,
}

async fn open_lines(path: &Path) -> Result<LinesStream<BufReader<File>>, HarvestError> {
    let file = File::open(path)
        .await
        .map_err(|source| HarvestError::InputUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(LinesStream::new(BufReader::new(file).lines()))
}

/// Lazy work-item source over either input shape.
pub enum IntakeSource {
    Jsonl(JsonlSource),
    ArticleIndex(ArticleIndexSource),
}

impl IntakeSource {
    /// Open the source named by the configuration.
    pub async fn open(config: &PipelineConfig) -> Result<Self, HarvestError> {
        match config.format {
            IntakeFormat::Jsonl => Ok(Self::Jsonl(JsonlSource::open(&config.input).await?)),
            IntakeFormat::ArticleIndex => Ok(Self::ArticleIndex(
                ArticleIndexSource::open(&config.input, &config.records_dir).await?,
            )),
        }
    }

    /// Next work item, or `None` when the input is exhausted.
    pub async fn next(&mut self) -> Result<Option<WorkItem>, HarvestError> {
        match self {
            Self::Jsonl(s) => s.next().await,
            Self::ArticleIndex(s) => s.next().await,
        }
    }
}

/// JSONL record stream: `{"url": ..., "evidence": "<digest>.txt"}` per line.
pub struct JsonlSource {
    path: PathBuf,
    lines: LinesStream<BufReader<File>>,
    line_no: u64,
}

impl JsonlSource {
    pub async fn open(path: &Path) -> Result<Self, HarvestError> {
        Ok(Self {
            path: path.to_path_buf(),
            lines: open_lines(path).await?,
            line_no: 0,
        })
    }

    pub async fn next(&mut self) -> Result<Option<WorkItem>, HarvestError> {
        loop {
            let Some(line) = self.lines.next().await else {
                return Ok(None);
            };
            self.line_no += 1;
            let line = line.map_err(|source| HarvestError::InputUnreadable {
                path: self.path.clone(),
                source,
            })?;

            if line.trim().is_empty() {
                continue;
            }

            let record: EvidenceRecord =
                serde_json::from_str(&line).map_err(|e| HarvestError::InvalidRecord {
                    line: self.line_no,
                    reason: e.to_string(),
                })?;

            let identifier = record
                .evidence
                .strip_suffix(".txt")
                .unwrap_or(&record.evidence)
                .to_owned();

            let recomputed = digest(&record.url);
            if recomputed != identifier {
                warn!(
                    url = %record.url,
                    evidence = %record.evidence,
                    recomputed = %recomputed,
                    "url digest does not match evidence filename; naming artifact after the evidence field"
                );
            }

            return Ok(Some(WorkItem {
                identifier,
                url: record.url,
            }));
        }
    }
}

/// Article-index stream: one record filename per line, each holding nested
/// link lists. Links are buffered per record, never per input file.
pub struct ArticleIndexSource {
    index: PathBuf,
    lines: LinesStream<BufReader<File>>,
    records_dir: PathBuf,
    pending: VecDeque<WorkItem>,
    line_no: u64,
}

impl ArticleIndexSource {
    pub async fn open(index: &Path, records_dir: &Path) -> Result<Self, HarvestError> {
        Ok(Self {
            index: index.to_path_buf(),
            lines: open_lines(index).await?,
            records_dir: records_dir.to_path_buf(),
            pending: VecDeque::new(),
            line_no: 0,
        })
    }

    pub async fn next(&mut self) -> Result<Option<WorkItem>, HarvestError> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Ok(Some(item));
            }

            let Some(line) = self.lines.next().await else {
                return Ok(None);
            };
            self.line_no += 1;
            let name = line.map_err(|source| HarvestError::InputUnreadable {
                path: self.index.clone(),
                source,
            })?;

            let name = name.trim();
            if name.is_empty() {
                continue;
            }

            let record_path = self.records_dir.join(name);
            let bytes = tokio::fs::read(&record_path).await.map_err(|source| {
                HarvestError::InputUnreadable {
                    path: record_path.clone(),
                    source,
                }
            })?;

            let article: ArticleRecord =
                serde_json::from_slice(&bytes).map_err(|e| HarvestError::InvalidRecord {
                    line: self.line_no,
                    reason: format!("{}: {e}", record_path.display()),
                })?;

            for sentence in article.sentences {
                for url in sentence.links {
                    self.pending.push_back(WorkItem {
                        identifier: digest(&url),
                        url,
                    });
                }
            }
        }
    }
}
