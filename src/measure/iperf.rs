//! iperf3 client adapter.
//!
//! Runs `iperf3 -c <server> -p <port> -J -t 10` under a hard deadline and
//! turns its JSON summary into a [`Measurement`].

use super::{MeasureError, ThroughputProbe};
use crate::models::{Measurement, Target, Throughput};
use chrono::Utc;
use serde::Deserialize;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Sample window requested from iperf3, in seconds.
pub const SAMPLE_SECONDS: u64 = 10;

/// Overall deadline for one invocation, startup and teardown included.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default iperf3 executable.
pub const DEFAULT_PROGRAM: &str = "iperf3";

/// Top level of `iperf3 -J` output. Only the fields we read are modelled.
#[derive(Debug, Deserialize)]
struct IperfReport {
    #[serde(default)]
    end: Option<EndSection>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EndSection {
    sum_sent: SumSent,
    sum_received: SumReceived,
}

#[derive(Debug, Deserialize)]
struct SumSent {
    bits_per_second: f64,
    #[serde(default)]
    bytes: u64,
    #[serde(default)]
    seconds: f64,
}

#[derive(Debug, Deserialize)]
struct SumReceived {
    bits_per_second: f64,
    #[serde(default)]
    bytes: u64,
}

/// Probe that measures throughput by running the iperf3 client.
#[derive(Debug, Clone)]
pub struct IperfProbe {
    target: Target,
    program: String,
    extra_args: Vec<String>,
    timeout: Duration,
}

impl IperfProbe {
    /// Create a probe for the given target using `program` as the iperf3 binary.
    pub fn new(target: Target, program: impl Into<String>) -> Self {
        Self {
            target,
            program: program.into(),
            extra_args: Vec::new(),
            timeout: TEST_TIMEOUT,
        }
    }

    /// Arguments placed before the fixed client arguments (e.g. `-4`).
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Override the overall deadline.
    #[cfg(test)]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full argument list passed to the tool.
    pub fn command_args(&self) -> Vec<String> {
        let mut args = self.extra_args.clone();
        args.extend([
            "-c".to_string(),
            self.target.server.clone(),
            "-p".to_string(),
            self.target.port.to_string(),
            "-J".to_string(),
            "-t".to_string(),
            SAMPLE_SECONDS.to_string(),
        ]);
        args
    }

    /// Spawn the tool once and classify what happened.
    async fn run_tool(&self) -> Result<Throughput, MeasureError> {
        debug!("Running {} {}", self.program, self.command_args().join(" "));

        let mut child = Command::new(&self.program)
            .args(self.command_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| MeasureError::Launch {
                program: self.program.clone(),
                source,
            })?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| MeasureError::Unexpected("stdout pipe not available".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| MeasureError::Unexpected("stderr pipe not available".to_string()))?;

        let run = async {
            let mut out = Vec::new();
            let mut err = Vec::new();
            let (status, out_read, err_read) = tokio::join!(
                child.wait(),
                stdout.read_to_end(&mut out),
                stderr.read_to_end(&mut err),
            );
            out_read?;
            err_read?;
            Ok::<_, std::io::Error>((status?, out, err))
        };

        let (status, out, err) = match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(done)) => done,
            Ok(Err(e)) => {
                drop((stdout, stderr));
                terminate(&mut child).await;
                return Err(MeasureError::Unexpected(e.to_string()));
            }
            Err(_) => {
                drop((stdout, stderr));
                terminate(&mut child).await;
                return Err(MeasureError::Timeout {
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        let stdout_text = String::from_utf8_lossy(&out);

        if !status.success() {
            let stderr_text = String::from_utf8_lossy(&err);
            return Err(MeasureError::ToolFailed(self.failure_message(
                status,
                &stdout_text,
                &stderr_text,
            )));
        }

        parse_report(&stdout_text, &self.target.server)
    }

    /// Pick the most useful description of a non-zero exit.
    ///
    /// With `-J`, iperf3 writes its error into the JSON on stdout and
    /// leaves stderr empty.
    fn failure_message(&self, status: ExitStatus, stdout: &str, stderr: &str) -> String {
        let stderr = stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }

        if let Ok(report) = serde_json::from_str::<IperfReport>(stdout) {
            if let Some(error) = report.error.filter(|e| !e.trim().is_empty()) {
                return error.trim().to_string();
            }
        }

        format!("{} exited with {}", self.program, status)
    }
}

impl ThroughputProbe for IperfProbe {
    async fn measure(&self) -> Measurement {
        let result = self.run_tool().await;
        let completed = Utc::now();

        match result {
            Ok(throughput) => {
                debug!(
                    "Measured {}: up {:.2} Mbps, down {:.2} Mbps",
                    self.target, throughput.upload_mbps, throughput.download_mbps
                );
                Measurement::success(completed, throughput)
            }
            Err(e) => {
                warn!("Measurement against {} failed: {}", self.target, e);
                Measurement::failure(completed, e.to_string())
            }
        }
    }
}

/// Kill the child and wait for it so no zombie is left behind.
async fn terminate(child: &mut Child) {
    if let Err(e) = child.kill().await {
        debug!("Failed to kill iperf3 process: {}", e);
    }
}

/// Parse `iperf3 -J` output into throughput figures.
fn parse_report(json: &str, server: &str) -> Result<Throughput, MeasureError> {
    let report: IperfReport =
        serde_json::from_str(json).map_err(|e| MeasureError::MalformedOutput(e.to_string()))?;

    if let Some(error) = report.error.filter(|e| !e.trim().is_empty()) {
        return Err(MeasureError::ToolFailed(error.trim().to_string()));
    }

    let end = report
        .end
        .ok_or_else(|| MeasureError::MalformedOutput("missing `end` section".to_string()))?;

    Ok(Throughput {
        server: server.to_string(),
        upload_mbps: bps_to_mbps(end.sum_sent.bits_per_second),
        download_mbps: bps_to_mbps(end.sum_received.bits_per_second),
        upload_bytes: end.sum_sent.bytes,
        download_bytes: end.sum_received.bytes,
        sample_seconds: end.sum_sent.seconds.max(0.0),
    })
}

/// Bits per second to megabits per second, rounded half-up to 2 decimals.
pub fn bps_to_mbps(bps: f64) -> f64 {
    let mbps = bps.max(0.0) / 1_000_000.0;
    (mbps * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_OUTPUT: &str = r#"{
        "start": {"connected": []},
        "intervals": [],
        "end": {
            "sum_sent": {"start": 0, "end": 10.0, "seconds": 10.0, "bytes": 62500000, "bits_per_second": 50000000.0, "retransmits": 0},
            "sum_received": {"start": 0, "end": 10.0, "seconds": 10.0, "bytes": 154320986, "bits_per_second": 123456789.0}
        }
    }"#;

    fn target() -> Target {
        Target {
            server: "iperf.example.net".to_string(),
            port: 5201,
        }
    }

    #[test]
    fn test_bps_to_mbps() {
        assert_eq!(bps_to_mbps(50_000_000.0), 50.0);
        assert_eq!(bps_to_mbps(123_456_789.0), 123.46);
        assert_eq!(bps_to_mbps(0.0), 0.0);
        assert_eq!(bps_to_mbps(-5.0), 0.0);
    }

    #[test]
    fn test_parse_report() {
        let t = parse_report(SAMPLE_OUTPUT, "iperf.example.net").unwrap();
        assert_eq!(t.server, "iperf.example.net");
        assert_eq!(t.upload_mbps, 50.0);
        assert_eq!(t.download_mbps, 123.46);
        assert_eq!(t.upload_bytes, 62_500_000);
        assert_eq!(t.download_bytes, 154_320_986);
        assert_eq!(t.sample_seconds, 10.0);
    }

    #[test]
    fn test_parse_report_missing_end() {
        let err = parse_report(r#"{"start": {}}"#, "x").unwrap_err();
        assert!(matches!(err, MeasureError::MalformedOutput(_)));
        assert!(err.to_string().starts_with("Failed to parse JSON output"));
    }

    #[test]
    fn test_parse_report_not_json() {
        let err = parse_report("iperf3: error - unable to connect", "x").unwrap_err();
        assert!(matches!(err, MeasureError::MalformedOutput(_)));
    }

    #[test]
    fn test_parse_report_embedded_error() {
        let err = parse_report(r#"{"error": "the server is busy running a test"}"#, "x")
            .unwrap_err();
        assert_eq!(err.to_string(), "the server is busy running a test");
    }

    #[test]
    fn test_command_args() {
        let probe = IperfProbe::new(target(), "iperf3").with_extra_args(vec!["-4".to_string()]);
        assert_eq!(
            probe.command_args(),
            vec!["-4", "-c", "iperf.example.net", "-p", "5201", "-J", "-t", "10"]
        );
    }

    #[tokio::test]
    async fn test_launch_failure_becomes_failed_measurement() {
        let probe = IperfProbe::new(target(), "/nonexistent/path/to/iperf3");
        let m = probe.measure().await;
        assert!(!m.is_success());
        assert!(m.error().unwrap().starts_with("Failed to launch"));
    }

    #[cfg(unix)]
    mod fake_tool {
        use super::*;
        use std::path::Path;
        use tempfile::TempDir;

        /// Probe running `sh <script>` so the script sees the iperf3 arguments as "$@".
        fn probe_for(dir: &TempDir, body: &str) -> IperfProbe {
            let script = dir.path().join("fake-iperf3.sh");
            std::fs::write(&script, body).unwrap();
            IperfProbe::new(target(), "sh")
                .with_extra_args(vec![script.to_string_lossy().into_owned()])
        }

        fn process_alive(pid: &str) -> bool {
            std::process::Command::new("sh")
                .args(["-c", &format!("kill -0 {} 2>/dev/null", pid)])
                .status()
                .map(|s| s.success())
                .unwrap_or(false)
        }

        fn quoted(path: &Path) -> String {
            format!("'{}'", path.display())
        }

        #[tokio::test]
        async fn test_successful_run() {
            let dir = TempDir::new().unwrap();
            let args_file = dir.path().join("args");
            let output_file = dir.path().join("output.json");
            std::fs::write(&output_file, SAMPLE_OUTPUT).unwrap();
            let probe = probe_for(
                &dir,
                &format!(
                    "echo \"$@\" > {}\ncat {}\n",
                    quoted(&args_file),
                    quoted(&output_file)
                ),
            );

            let m = probe.measure().await;

            let t = m.throughput().expect("measurement should succeed");
            assert_eq!(t.upload_mbps, 50.0);
            assert_eq!(t.download_mbps, 123.46);
            let args = std::fs::read_to_string(&args_file).unwrap();
            assert_eq!(args.trim(), "-c iperf.example.net -p 5201 -J -t 10");
        }

        #[tokio::test]
        async fn test_nonzero_exit_uses_stderr() {
            let dir = TempDir::new().unwrap();
            let probe = probe_for(&dir, "echo '  connection refused  ' >&2\nexit 1\n");

            let m = probe.measure().await;

            assert!(!m.is_success());
            assert_eq!(m.error(), Some("connection refused"));
        }

        #[tokio::test]
        async fn test_nonzero_exit_falls_back_to_json_error() {
            let dir = TempDir::new().unwrap();
            let probe = probe_for(
                &dir,
                "echo '{\"error\": \"unable to connect to server: Connection refused\"}'\nexit 1\n",
            );

            let m = probe.measure().await;

            assert_eq!(
                m.error(),
                Some("unable to connect to server: Connection refused")
            );
        }

        #[tokio::test]
        async fn test_nonzero_exit_without_output() {
            let dir = TempDir::new().unwrap();
            let probe = probe_for(&dir, "exit 3\n");

            let m = probe.measure().await;

            let error = m.error().unwrap();
            assert!(error.starts_with("sh exited with"));
        }

        #[tokio::test]
        async fn test_malformed_output() {
            let dir = TempDir::new().unwrap();
            let probe = probe_for(&dir, "echo 'not json at all'\n");

            let m = probe.measure().await;

            assert!(m
                .error()
                .unwrap()
                .starts_with("Failed to parse JSON output"));
        }

        #[tokio::test]
        async fn test_timeout_kills_process() {
            let dir = TempDir::new().unwrap();
            let pid_file = dir.path().join("pid");
            let probe = probe_for(
                &dir,
                &format!("echo $$ > {}\nexec sleep 30\n", quoted(&pid_file)),
            )
            .with_timeout(Duration::from_secs(1));

            let m = probe.measure().await;

            assert_eq!(m.error(), Some("Test timed out after 1 seconds"));
            let pid = std::fs::read_to_string(&pid_file).unwrap();
            assert!(!process_alive(pid.trim()));
        }
    }
}
