//! Append-only measurement log.
//!
//! One line per measurement, written and synced before `write` returns.

use crate::models::{Measurement, Outcome};
use anyhow::{Context, Result};
use chrono::SecondsFormat;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Durable line log of every measurement taken during the run.
#[derive(Debug)]
pub struct ResultLog {
    path: PathBuf,
    file: File,
}

impl ResultLog {
    /// Open (or create) the log file in append mode.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;

        debug!("Appending results to {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one measurement and push it to disk.
    pub fn write(&mut self, measurement: &Measurement) -> io::Result<()> {
        let mut line = format_log_line(measurement);
        line.push('\n');

        self.file.write_all(line.as_bytes())?;
        self.file.flush()?;
        self.file.sync_data()
    }
}

/// Format a measurement as a single log line (no trailing newline).
pub fn format_log_line(measurement: &Measurement) -> String {
    let timestamp = measurement
        .timestamp()
        .to_rfc3339_opts(SecondsFormat::Micros, true);

    match measurement.outcome() {
        Outcome::Success(t) => format!(
            "{} | SUCCESS | ↑{:6.2} Mbps | ↓{:6.2} Mbps | Server: {}",
            timestamp, t.upload_mbps, t.download_mbps, t.server
        ),
        Outcome::Failure { error } => format!("{} | FAILED | Error: {}", timestamp, error),
    }
}
