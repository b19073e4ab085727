//! # refharvest
//!
//! Resumable, content-addressed retrieval of cited reference documents,
//! with text conversion via an external converter.
//!
//! ## Why this crate?
//!
//! Harvesting the references cited by a large article corpus means fetching
//! hundreds of thousands of URLs, most of which will never change and many
//! of which are permanently broken. Naive re-crawling wastes days re-probing
//! dead links. This crate keys every URL by a content-addressed digest,
//! skips anything already converted on disk, and keeps a durable ledger of
//! permanently-failed digests so a restarted run touches the network only
//! for work that can still make progress.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input (JSONL / article index)
//!  │
//!  ├─ 1. Intake    map lines to (identifier, URL) pairs, dedup per run
//!  ├─ 2. Ledger    skip digests recorded as permanently failed
//!  ├─ 3. Store     skip digests whose artifact already exists
//!  ├─ 4. Probe     HEAD: status / content-type / length validation
//!  ├─ 5. Fetch     GET with re-validation, streamed to a temp file
//!  ├─ 6. Convert   external pdftotext, atomic publish as <digest>.txt
//!  └─ 7. Report    attempted / succeeded / failed counts
//! ```
//!
//! Concurrency is governed by four independent bounds: in-flight items,
//! network sessions, open staging files, and converter subprocesses.
//! An interrupt stops admissions, lets in-flight items drain, and flushes
//! the ledger before exit.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use refharvest::{run, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .input("refs.jsonl")
//!         .output_dir("evidence")
//!         .build()?;
//!     let report = run(config).await?;
//!     println!(
//!         "{} attempted, {} succeeded, {} failed",
//!         report.attempted, report.succeeded, report.failed
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `refharvest` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only
//! deps:
//! ```toml
//! refharvest = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod digest;
pub mod error;
pub mod governor;
pub mod ledger;
pub mod pipeline;
pub mod run;
pub mod stats;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{IntakeFormat, PipelineConfig, PipelineConfigBuilder};
pub use digest::digest;
pub use error::{FailureClass, HarvestError, ItemError, ResponseRejection};
pub use governor::ResourceGovernor;
pub use ledger::FailureLedger;
pub use pipeline::convert::Converter;
pub use pipeline::intake::{ArticleIndexSource, IntakeSource, JsonlSource, WorkItem};
pub use pipeline::retrieve::{Outcome, Retriever};
pub use run::{run, run_with_shutdown, run_with_shutdown_observed};
pub use stats::{RunReport, RunStats};
pub use store::ContentStore;
