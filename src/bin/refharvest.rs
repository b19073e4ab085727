//! CLI binary for refharvest.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig` and prints the run report.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use refharvest::{IntakeFormat, PipelineConfig, RunStats};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Harvest a JSONL record stream into ./evidence
  refharvest refs.jsonl

  # Article-index input: one record filename per line, records in ./out
  refharvest index.txt --format index --records-dir out

  # Custom ledger and output locations
  refharvest refs.jsonl -o /data/evidence --ledger /data/bad.txt

  # Throttle for a slow target host
  refharvest refs.jsonl --fetch-slots 8 --in-flight 16

  # Use the system pdftotext instead of the bundled binary
  refharvest refs.jsonl --converter pdftotext

  # Machine-readable summary
  refharvest refs.jsonl --json > report.json

INPUT SHAPES:
  jsonl   {"url": "https://...", "evidence": "<digest>.txt"} per line
  index   one record filename per line; each names a JSON article record
          with nested sentence link lists

RESUMABILITY:
  Artifacts land as <digest>.txt in the output directory; re-running skips
  any digest whose artifact exists. Permanently-failed digests are recorded
  in the ledger file (one per line) and skipped without network access on
  later runs. Delete the ledger to retry everything.

ENVIRONMENT VARIABLES:
  REFHARVEST_OUTPUT       Output directory
  REFHARVEST_LEDGER       Ledger file path
  REFHARVEST_CONVERTER    Converter binary
  RUST_LOG                Tracing filter (overrides -v/-q)
"#;

/// Retrieve cited reference documents and convert them to plain text.
#[derive(Parser, Debug)]
#[command(
    name = "refharvest",
    version,
    about = "Retrieve cited reference documents and convert them to plain text",
    long_about = "Retrieve a large set of reference documents by URL, deduplicated by a \
content-addressed digest, validated before download, converted to plain text via an external \
converter, and recorded in a durable failure ledger so interrupted or repeated runs never \
re-attempt known-bad sources.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input file: JSONL record stream or line-oriented article index.
    input: PathBuf,

    /// Input shape; `auto` infers from the file extension.
    #[arg(long, value_enum, default_value = "auto")]
    format: FormatArg,

    /// Directory holding per-article JSON records (index mode only).
    #[arg(long, default_value = "out")]
    records_dir: PathBuf,

    /// Directory receiving one <digest>.txt per converted document.
    #[arg(short, long, env = "REFHARVEST_OUTPUT", default_value = "evidence")]
    output: PathBuf,

    /// Failure-ledger file, one digest per line.
    #[arg(long, env = "REFHARVEST_LEDGER", default_value = "bad.txt")]
    ledger: PathBuf,

    /// Maximum work items in flight at once.
    #[arg(long, default_value_t = 100)]
    in_flight: usize,

    /// Concurrent network sessions.
    #[arg(long, default_value_t = 64)]
    fetch_slots: usize,

    /// Concurrent open staging files.
    #[arg(long, default_value_t = 256)]
    file_slots: usize,

    /// Concurrent converter subprocesses.
    #[arg(long, default_value_t = 8)]
    convert_slots: usize,

    /// Metadata-probe (HEAD) timeout in seconds.
    #[arg(long, default_value_t = 5)]
    probe_timeout: u64,

    /// Full-retrieval (GET) timeout in seconds.
    #[arg(long, default_value_t = 30)]
    fetch_timeout: u64,

    /// Reject responses declaring more than this many bytes.
    #[arg(long, default_value_t = 100_000_000)]
    max_content_length: u64,

    /// Accepted content type; repeat to accept several.
    #[arg(long = "content-type", default_values_t = [String::from("application/pdf"), String::from("x-pdf")])]
    content_types: Vec<String>,

    /// Converter binary, overriding platform resolution.
    #[arg(long, env = "REFHARVEST_CONVERTER")]
    converter: Option<PathBuf>,

    /// Print the run report as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable the progress display.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Auto,
    Jsonl,
    Index,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Per-item INFO logs would fight the progress display for the terminal;
    // when the bar is active only warnings and errors go to stderr.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = build_config(&cli)?;

    // ── Shutdown: first Ctrl-C stops admissions, the run then drains ─────
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!(
                    "{} interrupt received — draining in-flight work…",
                    cyan("◆")
                );
                shutdown.cancel();
            }
        });
    }

    // ── Progress display, polled from the shared counters ────────────────
    let stats = Arc::new(RunStats::new());
    let bar_task = if show_progress {
        Some(spawn_progress_bar(Arc::clone(&stats)))
    } else {
        None
    };

    let report = refharvest::run::run_with_shutdown_observed(config, shutdown, Arc::clone(&stats))
        .await
        .context("run failed")?;

    if let Some((bar, stop)) = bar_task {
        stop.cancel();
        bar.finish_and_clear();
    }

    // ── Summary ──────────────────────────────────────────────────────────
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !cli.quiet {
        let tick = if report.failed == 0 { green("✔") } else { cyan("⚠") };
        eprintln!(
            "{tick}  {}/{} succeeded  {}",
            bold(&report.succeeded.to_string()),
            report.attempted,
            if report.failed > 0 {
                red(&format!("{} failed", report.failed))
            } else {
                dim("no failures")
            },
        );
        if report.cancelled > 0 {
            eprintln!(
                "   {}",
                dim(&format!("{} interrupted by shutdown", report.cancelled))
            );
        }
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .input(&cli.input)
        .records_dir(&cli.records_dir)
        .output_dir(&cli.output)
        .ledger_path(&cli.ledger)
        .max_in_flight(cli.in_flight)
        .fetch_slots(cli.fetch_slots)
        .file_slots(cli.file_slots)
        .convert_slots(cli.convert_slots)
        .probe_timeout(Duration::from_secs(cli.probe_timeout))
        .fetch_timeout(Duration::from_secs(cli.fetch_timeout))
        .max_content_length(cli.max_content_length)
        .accepted_content_types(cli.content_types.iter().cloned());

    match cli.format {
        FormatArg::Auto => {}
        FormatArg::Jsonl => builder = builder.format(IntakeFormat::Jsonl),
        FormatArg::Index => builder = builder.format(IntakeFormat::ArticleIndex),
    }

    if let Some(ref converter) = cli.converter {
        builder = builder.converter(converter);
    }

    builder.build().context("invalid configuration")
}

/// Spinner showing live counts; total is unknown because intake is lazy.
fn spawn_progress_bar(stats: Arc<RunStats>) -> (ProgressBar, CancellationToken) {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed_precise}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_prefix("Harvesting");
    bar.enable_steady_tick(Duration::from_millis(80));

    let stop = CancellationToken::new();
    {
        let bar = bar.clone();
        let stop = stop.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_millis(250));
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tick.tick() => {
                        let r = stats.report();
                        bar.set_message(format!(
                            "{} done  ({} ok / {} failed)",
                            r.attempted, r.succeeded, r.failed
                        ));
                    }
                }
            }
        });
    }

    (bar, stop)
}
