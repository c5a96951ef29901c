//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation. Values left unset fall back to the
//! configuration file and then to built-in defaults.

use crate::report::ReportFormat;
use clap::Parser;
use std::path::PathBuf;

/// iperf-monitor - periodic iperf3 throughput monitor
///
/// Runs an iperf3 client test against one server at a fixed interval,
/// appends every result to a log file and keeps an HTML report up to date.
///
/// Examples:
///   iperf-monitor --server speedtest.init7.net
///   iperf-monitor --preset ams --interval 60
///   iperf-monitor -s iperf.example.net -p 5202 --duration 3600 --format json -o report.json
///   iperf-monitor --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// iperf3 server host name or address
    #[arg(short, long, value_name = "HOST", env = "IPERF_SERVER")]
    pub server: Option<String>,

    /// iperf3 server port [default: 5201]
    #[arg(short, long, value_name = "PORT", value_parser = clap::value_parser!(u16).range(1..))]
    pub port: Option<u16>,

    /// Use a well-known public iperf3 server
    ///
    /// An explicit --server or --port still takes precedence.
    #[arg(long, value_name = "NAME")]
    pub preset: Option<ServerPreset>,

    /// Seconds between the end of one test and the start of the next [default: 300]
    #[arg(short, long, value_name = "SECS")]
    pub interval: Option<u64>,

    /// Total session length in seconds; 0 runs until interrupted [default: 0]
    #[arg(short, long, value_name = "SECS")]
    pub duration: Option<u64>,

    /// File every result is appended to [default: iperf_speed_test.log]
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Report file, replaced on every refresh [default: iperf_speed_report.html]
    #[arg(short, long = "report", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Report format (html, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<ReportFormat>,

    /// iperf3 executable to run [default: iperf3]
    #[arg(long, value_name = "PATH", env = "IPERF3_BIN")]
    pub tool: Option<String>,

    /// Extra argument passed to iperf3 before the client arguments (repeatable)
    ///
    /// Example: --tool-arg=-4 --tool-arg=--bind --tool-arg=10.0.0.2
    #[arg(long = "tool-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub tool_args: Vec<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .iperf-monitor.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Do not show a spinner while a test runs
    #[arg(long)]
    pub no_progress: bool,

    /// Generate a default .iperf-monitor.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Public iperf3 servers offered as shortcuts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ServerPreset {
    /// ams.speedtest.clouvider.net (Amsterdam)
    Ams,
    /// speedtest.wtnet.de (Germany)
    Wtnet,
    /// speedtest.init7.net (Switzerland)
    Init7,
    /// lon.speedtest.clouvider.net (London)
    Lon,
    /// nyc.speedtest.clouvider.net (New York)
    Nyc,
}

impl ServerPreset {
    /// Host and port of the preset server.
    pub fn endpoint(&self) -> (&'static str, u16) {
        match self {
            ServerPreset::Ams => ("ams.speedtest.clouvider.net", 5200),
            ServerPreset::Wtnet => ("speedtest.wtnet.de", 5200),
            ServerPreset::Init7 => ("speedtest.init7.net", 5201),
            ServerPreset::Lon => ("lon.speedtest.clouvider.net", 5200),
            ServerPreset::Nyc => ("nyc.speedtest.clouvider.net", 5200),
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let Some(ref server) = self.server {
            if server.trim().is_empty() {
                return Err("Server address cannot be empty".to_string());
            }
        }

        if self.interval == Some(0) {
            return Err("Interval must be at least 1 second".to_string());
        }

        if let Some(ref tool) = self.tool {
            if tool.trim().is_empty() {
                return Err("Tool path cannot be empty".to_string());
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref config_path) = self.config {
            if !config_path.is_file() {
                return Err(format!(
                    "Config file does not exist: {}",
                    config_path.display()
                ));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Whether to draw a spinner while a test is running.
    pub fn show_progress(&self) -> bool {
        !self.quiet && !self.no_progress
    }
}
