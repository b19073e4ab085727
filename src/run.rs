//! Run orchestration: intake, admission, drain, and shutdown.
//!
//! The intake loop pulls `(identifier, URL)` pairs one at a time, admits
//! each under the top-level in-flight bound, and dispatches the retrieval
//! state machine without waiting for completion. Completion order across
//! items is unconstrained. The only components with ongoing lifecycles are
//! the ledger's background flusher and the progress reporter; both stop when
//! the run drains.
//!
//! Shutdown is a single cancellation token: once it fires, no new items are
//! admitted, in-flight items run to completion (blocked pool acquisitions
//! abort), and the ledger is flushed one final time after the drain.

use crate::config::PipelineConfig;
use crate::error::{FailureClass, HarvestError, ItemError};
use crate::governor::ResourceGovernor;
use crate::ledger::FailureLedger;
use crate::pipeline::convert::Converter;
use crate::pipeline::intake::IntakeSource;
use crate::pipeline::retrieve::Retriever;
use crate::stats::{RunReport, RunStats};
use crate::store::ContentStore;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Run the pipeline to completion with no external shutdown signal.
pub async fn run(config: PipelineConfig) -> Result<RunReport, HarvestError> {
    run_with_shutdown(config, CancellationToken::new()).await
}

/// Run the pipeline, stopping admissions when `shutdown` fires.
pub async fn run_with_shutdown(
    config: PipelineConfig,
    shutdown: CancellationToken,
) -> Result<RunReport, HarvestError> {
    run_with_shutdown_observed(config, shutdown, Arc::new(RunStats::new())).await
}

/// Run the pipeline with caller-supplied counters.
///
/// The caller may poll `stats` while the run is live (the CLI feeds its
/// progress display this way). All configuration-time failures surface here
/// before any work item is admitted; after that point the run always drains
/// and returns a report unless the input stream itself turns out to be
/// malformed.
pub async fn run_with_shutdown_observed(
    config: PipelineConfig,
    shutdown: CancellationToken,
    stats: Arc<RunStats>,
) -> Result<RunReport, HarvestError> {
    // ── Configuration-time setup; any failure here is fatal ──────────────
    let converter = Converter::resolve(config.converter.as_deref())?;
    let store = ContentStore::open(&config.output_dir).await?;
    let ledger = Arc::new(FailureLedger::load(&config.ledger_path).await?);
    let mut source = IntakeSource::open(&config).await?;

    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(HarvestError::ClientBuild)?;

    let config = Arc::new(config);
    let governor = Arc::new(ResourceGovernor::new(
        config.fetch_slots,
        config.file_slots,
        config.convert_slots,
    ));

    info!(
        input = %config.input.display(),
        output = %config.output_dir.display(),
        ledger = ledger.len(),
        "starting run"
    );

    // ── Background lifecycles: ledger flusher + progress reporter ────────
    let background_stop = CancellationToken::new();
    let flusher = {
        let ledger = Arc::clone(&ledger);
        let interval = config.flush_interval;
        let stop = background_stop.clone();
        tokio::spawn(async move { ledger.run_flusher(interval, stop).await })
    };
    let reporter = {
        let stats = Arc::clone(&stats);
        let interval = config.report_interval;
        let stop = background_stop.clone();
        tokio::spawn(async move { run_reporter(stats, interval, stop).await })
    };

    let retriever = Retriever::new(
        Arc::clone(&config),
        client,
        Arc::clone(&ledger),
        store,
        Arc::clone(&governor),
        converter,
        shutdown.clone(),
    );

    // ── Intake loop ──────────────────────────────────────────────────────
    let admission = Arc::new(Semaphore::new(config.max_in_flight));
    let mut admitted: HashSet<String> = HashSet::new();
    let mut workers = JoinSet::new();
    let mut fatal: Option<HarvestError> = None;

    loop {
        if shutdown.is_cancelled() {
            info!("shutdown requested; draining in-flight items");
            break;
        }

        let next = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("shutdown requested; draining in-flight items");
                break;
            }
            next = source.next() => next,
        };

        let item = match next {
            Ok(Some(item)) => item,
            Ok(None) => break,
            Err(e) => {
                fatal = Some(e);
                break;
            }
        };

        // One pass per digest per run; duplicates are common in article
        // link lists and would race on the store.
        if !admitted.insert(item.identifier.clone()) {
            debug!(url = %item.url, "duplicate digest this run; skipping");
            continue;
        }

        let permit = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("shutdown requested; draining in-flight items");
                break;
            }
            permit = Arc::clone(&admission).acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
        };

        let retriever = retriever.clone();
        let ledger = Arc::clone(&ledger);
        let stats = Arc::clone(&stats);
        workers.spawn(async move {
            let _admission = permit;

            match retriever.process(&item).await {
                Ok(outcome) => {
                    debug!(url = %item.url, ?outcome, "item succeeded");
                    stats.record_success();
                }
                Err(e) => match e.class() {
                    FailureClass::Permanent => {
                        // Ledger hits recur on every re-run; keep them quiet.
                        if !matches!(e, ItemError::KnownBad) {
                            warn!(url = %item.url, error = %e, "permanent failure");
                        }
                        ledger.mark_failed(&item.identifier);
                        stats.record_failure();
                    }
                    FailureClass::Transient => {
                        warn!(url = %item.url, error = %e, "transient failure; will retry next run");
                        stats.record_failure();
                    }
                    FailureClass::Cancelled => {
                        debug!(url = %item.url, "cancelled by shutdown");
                        stats.record_cancelled();
                    }
                },
            }
        });
    }

    // ── Drain ────────────────────────────────────────────────────────────
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "worker task aborted");
        }
    }

    background_stop.cancel();
    let _ = flusher.await;
    let _ = reporter.await;

    // Final flush after the drain: best-effort, like every other flush.
    if let Err(e) = ledger.flush().await {
        warn!(error = %e, "final ledger flush failed");
    }

    if let Some(e) = fatal {
        return Err(e);
    }

    let report = stats.report();
    info!(
        attempted = report.attempted,
        succeeded = report.succeeded,
        failed = report.failed,
        cancelled = report.cancelled,
        "run complete"
    );
    Ok(report)
}

/// Log aggregate progress at a fixed interval until `stop` fires.
async fn run_reporter(stats: Arc<RunStats>, interval: Duration, stop: CancellationToken) {
    let mut tick = tokio::time::interval(interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    tick.tick().await;

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tick.tick() => {
                let r = stats.report();
                info!(
                    attempted = r.attempted,
                    succeeded = r.succeeded,
                    failed = r.failed,
                    "progress"
                );
            }
        }
    }
}
