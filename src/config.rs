//! Configuration types for the retrieval pipeline.
//!
//! All run behaviour is controlled through [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share the config across worker tasks, log it at startup, and
//! diff two runs to understand why their outputs differ.

use crate::error::HarvestError;
use std::path::PathBuf;
use std::time::Duration;

/// How the input file maps lines to work items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntakeFormat {
    /// One JSON object per line with explicit `url` and `evidence` fields.
    #[default]
    Jsonl,
    /// One record filename per line; each names a JSON article record whose
    /// sentences carry nested link lists.
    ArticleIndex,
}

impl IntakeFormat {
    /// Infer the format from the input filename extension.
    ///
    /// `.jsonl`/`.ndjson` mean [`IntakeFormat::Jsonl`]; anything else is
    /// treated as a line-oriented article index.
    pub fn infer(input: &std::path::Path) -> Self {
        match input.extension().and_then(|e| e.to_str()) {
            Some("jsonl") | Some("ndjson") => IntakeFormat::Jsonl,
            _ => IntakeFormat::ArticleIndex,
        }
    }
}

/// Configuration for one pipeline run.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use refharvest::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .input("refs.jsonl")
///     .output_dir("evidence")
///     .fetch_slots(32)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Input file: a JSONL record stream or an article index. Default: `input.jsonl`.
    pub input: PathBuf,

    /// How input lines map to work items. Default: inferred from the input
    /// extension at build time.
    pub format: IntakeFormat,

    /// Directory holding per-article JSON records, consulted only in
    /// [`IntakeFormat::ArticleIndex`] mode. Default: `out`.
    pub records_dir: PathBuf,

    /// Directory receiving one `<digest>.txt` artifact per converted
    /// document; created on demand. Default: `evidence`.
    pub output_dir: PathBuf,

    /// Flat-file failure ledger, one digest per line. Missing at startup is
    /// not an error. Default: `bad.txt`.
    pub ledger_path: PathBuf,

    /// Maximum work items in flight at once — the top-level admission bound,
    /// independent of the three resource pools. Default: 100.
    pub max_in_flight: usize,

    /// Concurrent network sessions (probe + fetch share one slot per item).
    /// Default: 64.
    pub fetch_slots: usize,

    /// Concurrent open staging files. Staging outlives the network phase, so
    /// this is sized independently of `fetch_slots`. Default: 256.
    pub file_slots: usize,

    /// Concurrent external-converter subprocesses. The smallest pool:
    /// conversion is CPU- and process-table-expensive. Default: 8.
    pub convert_slots: usize,

    /// Timeout for the metadata probe (HEAD). Default: 5 s.
    pub probe_timeout: Duration,

    /// Timeout for the full retrieval (GET), covering the body stream.
    /// Default: 30 s.
    pub fetch_timeout: Duration,

    /// Upper bound on the declared Content-Length; larger responses are
    /// rejected before any body is read. Default: 100 000 000 bytes.
    pub max_content_length: u64,

    /// Accepted MIME types, compared case-insensitively with parameters
    /// stripped. Default: `application/pdf`, `x-pdf`.
    pub accepted_content_types: Vec<String>,

    /// Interval between background ledger flushes. Default: 500 ms.
    pub flush_interval: Duration,

    /// Interval between progress log lines. Default: 5 s.
    pub report_interval: Duration,

    /// Explicit converter binary, overriding platform resolution.
    pub converter: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("input.jsonl"),
            format: IntakeFormat::Jsonl,
            records_dir: PathBuf::from("out"),
            output_dir: PathBuf::from("evidence"),
            ledger_path: PathBuf::from("bad.txt"),
            max_in_flight: 100,
            fetch_slots: 64,
            file_slots: 256,
            convert_slots: 8,
            probe_timeout: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(30),
            max_content_length: 100_000_000,
            accepted_content_types: vec!["application/pdf".into(), "x-pdf".into()],
            flush_interval: Duration::from_millis(500),
            report_interval: Duration::from_secs(5),
            converter: None,
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
            format_set: false,
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
    format_set: bool,
}

impl PipelineConfigBuilder {
    pub fn input(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.input = path.into();
        self
    }

    pub fn format(mut self, format: IntakeFormat) -> Self {
        self.config.format = format;
        self.format_set = true;
        self
    }

    pub fn records_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.records_dir = path.into();
        self
    }

    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_dir = path.into();
        self
    }

    pub fn ledger_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ledger_path = path.into();
        self
    }

    pub fn max_in_flight(mut self, n: usize) -> Self {
        self.config.max_in_flight = n.max(1);
        self
    }

    pub fn fetch_slots(mut self, n: usize) -> Self {
        self.config.fetch_slots = n.max(1);
        self
    }

    pub fn file_slots(mut self, n: usize) -> Self {
        self.config.file_slots = n.max(1);
        self
    }

    pub fn convert_slots(mut self, n: usize) -> Self {
        self.config.convert_slots = n.max(1);
        self
    }

    pub fn probe_timeout(mut self, d: Duration) -> Self {
        self.config.probe_timeout = d;
        self
    }

    pub fn fetch_timeout(mut self, d: Duration) -> Self {
        self.config.fetch_timeout = d;
        self
    }

    pub fn max_content_length(mut self, bytes: u64) -> Self {
        self.config.max_content_length = bytes;
        self
    }

    pub fn accepted_content_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.accepted_content_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn flush_interval(mut self, d: Duration) -> Self {
        self.config.flush_interval = d;
        self
    }

    pub fn report_interval(mut self, d: Duration) -> Self {
        self.config.report_interval = d;
        self
    }

    pub fn converter(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.converter = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// Unless [`format`](Self::format) was called, the intake format is
    /// inferred from the input filename.
    pub fn build(mut self) -> Result<PipelineConfig, HarvestError> {
        if !self.format_set {
            self.config.format = IntakeFormat::infer(&self.config.input);
        }

        let c = &self.config;
        if c.accepted_content_types.is_empty() {
            return Err(HarvestError::InvalidConfig(
                "accepted content-type set must not be empty".into(),
            ));
        }
        if c.max_content_length == 0 {
            return Err(HarvestError::InvalidConfig(
                "max content length must be > 0".into(),
            ));
        }
        if c.probe_timeout.is_zero() || c.fetch_timeout.is_zero() {
            return Err(HarvestError::InvalidConfig(
                "timeouts must be > 0".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::builder().build().unwrap();
        assert_eq!(config.max_in_flight, 100);
        assert_eq!(config.max_content_length, 100_000_000);
        assert_eq!(
            config.accepted_content_types,
            vec!["application/pdf".to_string(), "x-pdf".to_string()]
        );
    }

    #[test]
    fn format_inferred_from_extension() {
        assert_eq!(
            IntakeFormat::infer(std::path::Path::new("refs.jsonl")),
            IntakeFormat::Jsonl
        );
        assert_eq!(
            IntakeFormat::infer(std::path::Path::new("index.txt")),
            IntakeFormat::ArticleIndex
        );

        let config = PipelineConfig::builder().input("index.txt").build().unwrap();
        assert_eq!(config.format, IntakeFormat::ArticleIndex);
    }

    #[test]
    fn explicit_format_wins_over_inference() {
        let config = PipelineConfig::builder()
            .input("index.txt")
            .format(IntakeFormat::Jsonl)
            .build()
            .unwrap();
        assert_eq!(config.format, IntakeFormat::Jsonl);
    }

    #[test]
    fn capacities_clamp_to_one() {
        let config = PipelineConfig::builder()
            .max_in_flight(0)
            .fetch_slots(0)
            .file_slots(0)
            .convert_slots(0)
            .build()
            .unwrap();
        assert_eq!(config.max_in_flight, 1);
        assert_eq!(config.fetch_slots, 1);
        assert_eq!(config.file_slots, 1);
        assert_eq!(config.convert_slots, 1);
    }

    #[test]
    fn empty_content_type_set_is_rejected() {
        let err = PipelineConfig::builder()
            .accepted_content_types(Vec::<String>::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, HarvestError::InvalidConfig(_)));
    }
}
