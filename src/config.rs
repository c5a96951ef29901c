//! Configuration file handling.
//!
//! This module handles loading `.iperf-monitor.toml`, merging it with
//! command-line arguments and resolving the settings the scheduler runs with.

use crate::cli::Args;
use crate::models::Target;
use crate::report::ReportFormat;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".iperf-monitor.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server under test.
    #[serde(default)]
    pub target: TargetConfig,

    /// Test timing.
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Log and report files.
    #[serde(default)]
    pub output: OutputConfig,

    /// iperf3 executable settings.
    #[serde(default)]
    pub tool: ToolConfig,
}

/// iperf3 server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Server host name or address.
    #[serde(default = "default_server")]
    pub server: String,

    /// Server port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            port: default_port(),
        }
    }
}

fn default_server() -> String {
    "speedtest.serverius.net".to_string()
}

fn default_port() -> u16 {
    5201
}

/// Test timing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds between tests.
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,

    /// Total session length in seconds; 0 means run until interrupted.
    #[serde(default)]
    pub duration_seconds: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval(),
            duration_seconds: 0,
        }
    }
}

fn default_interval() -> u64 {
    300 // 5 minutes
}

/// Output file settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Append-only result log.
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    /// Report file, replaced on every refresh.
    #[serde(default = "default_report_file")]
    pub report_file: PathBuf,

    /// Report format.
    #[serde(default)]
    pub format: ReportFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            log_file: default_log_file(),
            report_file: default_report_file(),
            format: ReportFormat::default(),
        }
    }
}

fn default_log_file() -> PathBuf {
    PathBuf::from("iperf_speed_test.log")
}

fn default_report_file() -> PathBuf {
    PathBuf::from("iperf_speed_report.html")
}

/// iperf3 executable settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Program to run.
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments placed before the client arguments.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            extra_args: Vec::new(),
        }
    }
}

fn default_program() -> String {
    crate::measure::iperf::DEFAULT_PROGRAM.to_string()
}

/// Validated settings handed to the scheduler once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub server: String,
    pub port: u16,
    pub interval: Duration,
    /// `None` runs until cancelled.
    pub duration: Option<Duration>,
}

impl RunConfig {
    pub fn target(&self) -> Target {
        Target {
            server: self.server.clone(),
            port: self.port,
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only values given on the command line override the file. A preset
    /// replaces the target, then explicit --server/--port win over it.
    pub fn merge_with_args(&mut self, args: &Args) {
        if let Some(preset) = args.preset {
            let (server, port) = preset.endpoint();
            self.target.server = server.to_string();
            self.target.port = port;
        }
        if let Some(ref server) = args.server {
            self.target.server = server.trim().to_string();
        }
        if let Some(port) = args.port {
            self.target.port = port;
        }

        if let Some(interval) = args.interval {
            self.schedule.interval_seconds = interval;
        }
        if let Some(duration) = args.duration {
            self.schedule.duration_seconds = duration;
        }

        if let Some(ref log_file) = args.log_file {
            self.output.log_file = log_file.clone();
        }
        if let Some(ref report) = args.output {
            self.output.report_file = report.clone();
        }
        if let Some(format) = args.format {
            self.output.format = format;
        }

        if let Some(ref tool) = args.tool {
            self.tool.program = tool.clone();
        }
        if !args.tool_args.is_empty() {
            self.tool.extra_args = args.tool_args.clone();
        }
    }

    /// Validate and convert into the scheduler's run settings.
    pub fn resolve(&self) -> Result<RunConfig> {
        let server = self.target.server.trim();
        if server.is_empty() {
            bail!("Server address cannot be empty");
        }
        if self.target.port == 0 {
            bail!("Port must be between 1 and 65535");
        }
        if self.schedule.interval_seconds == 0 {
            bail!("Interval must be greater than 0");
        }

        let duration = match self.schedule.duration_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(RunConfig {
            server: server.to_string(),
            port: self.target.port,
            interval: Duration::from_secs(self.schedule.interval_seconds),
            duration,
        })
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
