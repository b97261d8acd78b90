//! Failure log consolidation
//!
//! Successful jobs delete their logs, so whatever is left below the log
//! directory after a run belongs to a failed or interrupted transfer. The
//! consolidator appends those files to one cumulative log for the operator.

use crate::dispatcher::LOG_OUTPUT_MARKER;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};
use walkdir::WalkDir;

/// Written in place of the content of an empty log file
pub const EMPTY_LOG_MARKER: &str = "no log data";

/// Appends leftover job logs to the cumulative log
pub struct LogConsolidator {
    log_dir: PathBuf,
    target: PathBuf,
}

impl LogConsolidator {
    pub fn new(log_dir: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            target: target.into(),
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Append every log of a selected repository to the cumulative log
    ///
    /// I/O problems are reported through the log and never fail the run.
    /// Returns the number of files appended.
    pub fn consolidate(&self, selection: &[String]) -> usize {
        match self.try_consolidate(selection) {
            Ok(count) => {
                if count > 0 {
                    info!(
                        "Appended {} failed transfer logs to {}",
                        count,
                        self.target.display()
                    );
                }
                count
            }
            Err(e) => {
                error!(
                    "Failed to consolidate logs into {}: {}",
                    self.target.display(),
                    e
                );
                0
            }
        }
    }

    fn try_consolidate(&self, selection: &[String]) -> io::Result<usize> {
        if !self.log_dir.is_dir() {
            debug!("No log directory at {}", self.log_dir.display());
            return Ok(0);
        }

        let mut output: Option<std::fs::File> = None;
        let mut count = 0;

        for entry in WalkDir::new(&self.log_dir).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "log") {
                continue;
            }
            let relative = path.strip_prefix(&self.log_dir).unwrap_or(path);
            let relative = relative.to_string_lossy();
            if !selection.iter().any(|repo| relative.contains(repo.as_str())) {
                continue;
            }

            if output.is_none() {
                output = Some(
                    OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&self.target)?,
                );
            }
            let Some(file) = output.as_mut() else {
                continue;
            };

            // Transfer output is copied as is, whatever its encoding
            let content = std::fs::read(path)?;
            writeln!(file, "{}:", path.display())?;
            if is_blank(&content) {
                writeln!(file, "{}", EMPTY_LOG_MARKER)?;
            } else {
                file.write_all(&content)?;
                if !content.ends_with(b"\n") {
                    writeln!(file)?;
                }
                if output_section(&content).is_some_and(is_blank) {
                    writeln!(file, "{}", EMPTY_LOG_MARKER)?;
                }
            }
            count += 1;
        }

        Ok(count)
    }
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}

/// What the transfer wrote after the job header, if the log has one
fn output_section(content: &[u8]) -> Option<&[u8]> {
    let marker = LOG_OUTPUT_MARKER.as_bytes();
    content
        .windows(marker.len())
        .position(|window| window == marker)
        .map(|start| &content[start + marker.len()..])
}
