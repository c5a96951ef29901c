//! Throughput measurement via the external iperf3 client.
//!
//! The scheduler talks to a [`ThroughputProbe`]; [`IperfProbe`] is the
//! implementation that shells out to iperf3.

pub mod iperf;

pub use iperf::IperfProbe;

use crate::models::Measurement;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

/// Something that can take one throughput measurement.
///
/// Implementations never fail: every problem is recorded as a failed
/// [`Measurement`].
pub trait ThroughputProbe {
    async fn measure(&self) -> Measurement;
}

/// Ways a single iperf3 invocation can go wrong.
#[derive(Debug, Error)]
pub enum MeasureError {
    /// The tool could not be started at all.
    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool ran past the overall deadline and was killed.
    #[error("Test timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// The tool reported an error (non-zero exit or an `error` field).
    #[error("{0}")]
    ToolFailed(String),

    /// Output did not have the expected JSON structure.
    #[error("Failed to parse JSON output: {0}")]
    MalformedOutput(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Check whether the tool can be executed (`<program> --version`).
pub async fn check_installed(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Print installation hints for iperf3.
pub fn print_install_instructions() {
    println!("📦 iperf3 is not installed or could not be run. Please install it first:");
    println!("\n   macOS:            brew install iperf3");
    println!("   Ubuntu/Debian:    sudo apt update && sudo apt install iperf3");
    println!("   Fedora/RHEL:      sudo dnf install iperf3");
    println!("   Windows:          https://iperf.fr/iperf-download.php");
    println!("\n   Or point --tool (IPERF3_BIN) at an existing binary.");
}
