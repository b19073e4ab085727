//! External converter adapter.
//!
//! Text extraction is delegated to a `pdftotext` subprocess with a
//! text-or-failure contract: exit status zero and an output file, or a
//! captured diagnostic. The adapter never retries — retry policy is a
//! run-level decision.
//!
//! The binary is resolved once at startup from the target platform;
//! an unsupported platform without an explicit override is a fatal
//! configuration error, not a per-item failure.

use crate::error::{HarvestError, ItemError};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

/// Bundled converter locations, keyed by platform.
const LINUX_CONVERTER: &str = "bin/pdftotext_linux64";
const WINDOWS_CONVERTER: &str = "bin/pdftotext_win64.exe";

/// Resolved handle to the external text-conversion facility.
#[derive(Debug, Clone)]
pub struct Converter {
    program: PathBuf,
}

impl Converter {
    /// Resolve the converter binary for the current platform, or use the
    /// configured override.
    pub fn resolve(override_path: Option<&Path>) -> Result<Self, HarvestError> {
        if let Some(program) = override_path {
            // A bare command name is looked up on PATH at spawn time; an
            // explicit path we can check now, before any work is admitted.
            if program.components().count() > 1 && !program.exists() {
                return Err(HarvestError::InvalidConfig(format!(
                    "converter binary not found: {}",
                    program.display()
                )));
            }
            return Ok(Self {
                program: program.to_path_buf(),
            });
        }

        let program = match std::env::consts::OS {
            "linux" => LINUX_CONVERTER,
            "windows" => WINDOWS_CONVERTER,
            os => {
                return Err(HarvestError::UnsupportedPlatform { os: os.to_owned() });
            }
        };

        Ok(Self {
            program: PathBuf::from(program),
        })
    }

    /// Convert `staged` into a text file at `output`.
    ///
    /// Diagnostic text (combined stdout and stderr) is captured, never
    /// interleaved with our own logs. On failure any partial output is
    /// removed.
    pub async fn convert(&self, staged: &Path, output: &Path) -> Result<(), ItemError> {
        debug!(program = %self.program.display(), staged = %staged.display(), "converting");

        let result = Command::new(&self.program)
            .arg("-nopgbrk")
            .arg("-q")
            .arg(staged)
            .arg(output)
            .kill_on_drop(true)
            .output()
            .await;

        let out = match result {
            Ok(out) => out,
            Err(e) => {
                return Err(ItemError::Conversion {
                    diagnostic: format!("failed to spawn {}: {e}", self.program.display()),
                });
            }
        };

        if !out.status.success() {
            let _ = tokio::fs::remove_file(output).await;
            let mut diagnostic = String::from_utf8_lossy(&out.stdout).into_owned();
            diagnostic.push_str(&String::from_utf8_lossy(&out.stderr));
            return Err(ItemError::Conversion {
                diagnostic: format!("exit {}: {}", out.status, diagnostic.trim()),
            });
        }

        // Exit zero with no output file still counts as a failed conversion.
        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(ItemError::Conversion {
                diagnostic: "converter exited 0 but produced no output".into(),
            });
        }

        Ok(())
    }

    /// Program the adapter will invoke.
    pub fn program(&self) -> &Path {
        &self.program
    }
}
