//! Data models for the throughput monitor.
//!
//! This module contains the core data structures shared by the
//! measurement adapter, the result store, and the report pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Throughput figures from one successful iperf3 run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Throughput {
    /// Server the test ran against.
    pub server: String,
    /// Sent bitrate in Mbps, rounded to 2 decimals.
    pub upload_mbps: f64,
    /// Received bitrate in Mbps, rounded to 2 decimals.
    pub download_mbps: f64,
    /// Bytes sent during the sample window.
    pub upload_bytes: u64,
    /// Bytes received during the sample window.
    pub download_bytes: u64,
    /// Length of the sample window as reported by iperf3.
    pub sample_seconds: f64,
}

/// Outcome of a single measurement attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Success(Throughput),
    Failure { error: String },
}

/// One recorded measurement attempt.
///
/// Built through [`Measurement::success`] or [`Measurement::failure`]
/// and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    /// Completion time of the attempt.
    timestamp: DateTime<Utc>,
    /// What the attempt produced.
    outcome: Outcome,
}

impl Measurement {
    /// Creates a successful measurement.
    pub fn success(timestamp: DateTime<Utc>, throughput: Throughput) -> Self {
        Self {
            timestamp,
            outcome: Outcome::Success(throughput),
        }
    }

    /// Creates a failed measurement.
    ///
    /// Multi-line text is joined into one line with ` | `; an empty
    /// description becomes "Unknown error".
    pub fn failure(timestamp: DateTime<Utc>, error: impl Into<String>) -> Self {
        let error = single_line(&error.into());
        let error = if error.is_empty() {
            "Unknown error".to_string()
        } else {
            error
        };

        Self {
            timestamp,
            outcome: Outcome::Failure { error },
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success(_))
    }

    /// Returns the throughput figures if the attempt succeeded.
    pub fn throughput(&self) -> Option<&Throughput> {
        match &self.outcome {
            Outcome::Success(t) => Some(t),
            Outcome::Failure { .. } => None,
        }
    }

    /// Returns the error description if the attempt failed.
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success(_) => None,
            Outcome::Failure { error } => Some(error),
        }
    }
}

fn single_line(text: &str) -> String {
    text.split(|c| c == '\n' || c == '\r')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Summary statistics over a snapshot of measurements.
///
/// Rates and bitrates are computed over successful attempts only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThroughputSummary {
    /// Number of attempts.
    pub total: usize,
    /// Number of successful attempts.
    pub success_count: usize,
    /// Number of failed attempts.
    pub fail_count: usize,
    /// Percentage of successful attempts (0-100).
    pub success_rate: f64,
    pub avg_upload: f64,
    pub avg_download: f64,
    pub max_upload: f64,
    pub max_download: f64,
    pub min_upload: f64,
    pub min_download: f64,
}

/// An iperf3 server to test against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub server: String,
    pub port: u16,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.server, self.port)
    }
}
