//! HTML and JSON report generation.
//!
//! This module renders the rolling speed report from the result store
//! and replaces the report file atomically on every write.

use crate::analysis::aggregate;
use crate::models::{Measurement, Outcome, Target, ThroughputSummary};
use crate::store::ResultStore;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

/// Number of most recent measurements listed in a report.
pub const RECENT_RESULTS: usize = 50;

/// Report file format.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Self-contained HTML page (default)
    #[default]
    Html,
    /// JSON document
    Json,
}

/// Errors raised while rendering or replacing the report.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to replace report file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Metadata shown in the report header.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
    /// Server and port under test.
    pub target: String,
    /// Number of measurements in the store.
    pub total_results: usize,
    /// Number of measurements listed in the results table.
    pub shown_results: usize,
}

/// A complete report: header, statistics and the recent results window.
#[derive(Debug, Clone, Serialize)]
pub struct ReportDocument<'a> {
    pub metadata: ReportMetadata,
    pub summary: ThroughputSummary,
    pub results: &'a [Measurement],
}

/// Build the report document for the current contents of the store.
pub fn build_report<'a>(
    store: &'a ResultStore,
    target: &Target,
    generated_at: DateTime<Utc>,
) -> ReportDocument<'a> {
    let summary = aggregate(store.snapshot());
    let results = store.last_n(RECENT_RESULTS);

    ReportDocument {
        metadata: ReportMetadata {
            generated_at,
            target: target.to_string(),
            total_results: store.count(),
            shown_results: results.len(),
        },
        summary,
        results,
    }
}

/// Generate a complete HTML report.
pub fn generate_html_report(report: &ReportDocument<'_>) -> String {
    let mut output = String::new();

    output.push_str(&generate_head());
    output.push_str("<body>\n");
    output.push_str(&generate_header_section(&report.metadata));
    output.push_str(&generate_summary_boxes(&report.summary));
    output.push_str(&generate_statistics_table(&report.summary));
    output.push_str(&generate_results_table(report.results));
    output.push_str("</body>\n</html>\n");

    output
}

/// Document head with the inline stylesheet.
fn generate_head() -> String {
    let mut head = String::new();

    head.push_str("<!DOCTYPE html>\n<html>\n<head>\n");
    head.push_str("    <meta charset=\"utf-8\">\n");
    head.push_str("    <title>IPERF Speed Test Report</title>\n");
    head.push_str("    <style>\n");
    head.push_str("        body { font-family: Arial, sans-serif; margin: 20px; }\n");
    head.push_str(
        "        .header { background: #2196F3; color: white; padding: 20px; border-radius: 5px; }\n",
    );
    head.push_str("        .stats { display: flex; gap: 20px; margin: 20px 0; }\n");
    head.push_str(
        "        .stat-box { background: #f5f5f5; padding: 15px; border-radius: 5px; flex: 1; }\n",
    );
    head.push_str(
        "        .stat-value { font-size: 24px; font-weight: bold; color: #2196F3; }\n",
    );
    head.push_str("        .success { color: #4CAF50; }\n");
    head.push_str("        .failure { color: #f44336; }\n");
    head.push_str(
        "        table { width: 100%; border-collapse: collapse; margin-top: 20px; }\n",
    );
    head.push_str(
        "        th, td { padding: 10px; text-align: left; border-bottom: 1px solid #ddd; }\n",
    );
    head.push_str("        th { background-color: #f2f2f2; }\n");
    head.push_str("    </style>\n</head>\n");

    head
}

fn generate_header_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("    <div class=\"header\">\n");
    section.push_str("        <h1>🚀 IPERF Speed Test Report</h1>\n");
    section.push_str(&format!(
        "        <p>Generated: {}</p>\n",
        metadata
            .generated_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
    ));
    section.push_str(&format!(
        "        <p>Server: {}</p>\n",
        escape_html(&metadata.target)
    ));
    section.push_str("    </div>\n");

    section
}

/// Headline boxes; rates and averages use one decimal.
fn generate_summary_boxes(summary: &ThroughputSummary) -> String {
    let boxes = [
        (summary.total.to_string(), "Total Tests"),
        (summary.success_count.to_string(), "Successful"),
        (summary.fail_count.to_string(), "Failed"),
        (format!("{:.1}%", summary.success_rate), "Success Rate"),
        (format!("{:.1}", summary.avg_download), "Avg Download (Mbps)"),
        (format!("{:.1}", summary.avg_upload), "Avg Upload (Mbps)"),
    ];

    let mut section = String::new();
    section.push_str("    <div class=\"stats\">\n");
    for (value, label) in boxes {
        section.push_str("        <div class=\"stat-box\">\n");
        section.push_str(&format!(
            "            <div class=\"stat-value\">{}</div>\n",
            value
        ));
        section.push_str(&format!("            <div>{}</div>\n", label));
        section.push_str("        </div>\n");
    }
    section.push_str("    </div>\n");

    section
}

fn generate_statistics_table(summary: &ThroughputSummary) -> String {
    let rows = [
        ("Average", summary.avg_download, summary.avg_upload),
        ("Maximum", summary.max_download, summary.max_upload),
        ("Minimum", summary.min_download, summary.min_upload),
    ];

    let mut section = String::new();
    section.push_str("    <h2>Speed Statistics</h2>\n");
    section.push_str(&format!(
        "    <p>Success rate: {:.2}%</p>\n",
        summary.success_rate
    ));
    section.push_str("    <table>\n");
    section.push_str(
        "        <tr><th>Metric</th><th>Download (Mbps)</th><th>Upload (Mbps)</th></tr>\n",
    );
    for (metric, download, upload) in rows {
        section.push_str(&format!(
            "        <tr><td>{}</td><td>{:.2}</td><td>{:.2}</td></tr>\n",
            metric, download, upload
        ));
    }
    section.push_str("    </table>\n");

    section
}

fn generate_results_table(results: &[Measurement]) -> String {
    let mut section = String::new();

    section.push_str("    <h2>Recent Test Results</h2>\n");
    section.push_str("    <table>\n");
    section.push_str(
        "        <tr><th>Timestamp</th><th>Status</th><th>Download (Mbps)</th><th>Upload (Mbps)</th><th>Details</th></tr>\n",
    );
    for measurement in results {
        section.push_str(&generate_result_row(measurement));
    }
    section.push_str("    </table>\n");

    section
}

/// One row of the results table.
fn generate_result_row(measurement: &Measurement) -> String {
    let time = measurement
        .timestamp()
        .with_timezone(&Local)
        .format("%H:%M:%S");

    match measurement.outcome() {
        Outcome::Success(t) => format!(
            "        <tr class=\"success\"><td>{}</td><td>✅ Success</td><td>{:.2}</td><td>{:.2}</td><td>Duration: {:.1}s</td></tr>\n",
            time, t.download_mbps, t.upload_mbps, t.sample_seconds
        ),
        Outcome::Failure { error } => format!(
            "        <tr class=\"failure\"><td>{}</td><td>❌ Failed</td><td>-</td><td>-</td><td>{}</td></tr>\n",
            time,
            escape_html(error)
        ),
    }
}

/// Escape text for inclusion in HTML element content.
fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Generate a JSON report.
pub fn generate_json_report(report: &ReportDocument<'_>) -> Result<String, ReportError> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Write `content` to `path` so readers only ever see a complete file.
///
/// The content goes to a temporary file in the same directory which is then
/// renamed over the destination.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<(), ReportError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.as_file().sync_data()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))?;
    }

    tmp.persist(path)?;
    Ok(())
}

/// Renders the store into the report file for one target.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    path: PathBuf,
    format: ReportFormat,
    target: Target,
}

impl ReportWriter {
    pub fn new(path: PathBuf, format: ReportFormat, target: Target) -> Self {
        Self {
            path,
            format,
            target,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Render the report content without touching the filesystem.
    pub fn render(
        &self,
        store: &ResultStore,
        generated_at: DateTime<Utc>,
    ) -> Result<String, ReportError> {
        let report = build_report(store, &self.target, generated_at);

        match self.format {
            ReportFormat::Html => Ok(generate_html_report(&report)),
            ReportFormat::Json => generate_json_report(&report),
        }
    }

    /// Render the current store and replace the report file.
    pub fn write(&self, store: &ResultStore) -> Result<(), ReportError> {
        let content = self.render(store, Utc::now())?;
        write_atomic(&self.path, content.as_bytes())?;

        debug!(
            "Report with {} results written to {}",
            store.count(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Throughput;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn target() -> Target {
        Target {
            server: "speedtest.init7.net".to_string(),
            port: 5201,
        }
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn success(i: i64, upload: f64, download: f64) -> Measurement {
        Measurement::success(
            base_time() + Duration::minutes(i),
            Throughput {
                server: "speedtest.init7.net".to_string(),
                upload_mbps: upload,
                download_mbps: download,
                upload_bytes: 1_000,
                download_bytes: 2_000,
                sample_seconds: 10.0,
            },
        )
    }

    fn store_with(n: i64) -> ResultStore {
        let mut store = ResultStore::new();
        for i in 0..n {
            if i % 4 == 3 {
                store.append(Measurement::failure(
                    base_time() + Duration::minutes(i),
                    format!("failure #{}", i),
                ));
            } else {
                store.append(success(i, 10.0 + i as f64, 100.0 + i as f64));
            }
        }
        store
    }

    fn row_count(html: &str) -> usize {
        html.matches("<tr class=\"success\">").count() + html.matches("<tr class=\"failure\">").count()
    }

    #[test]
    fn test_generate_html_report() {
        let store = store_with(4);
        let report = build_report(&store, &target(), base_time());
        let html = generate_html_report(&report);

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("IPERF Speed Test Report"));
        assert!(html.contains("Server: speedtest.init7.net:5201"));
        assert!(html.contains("Total Tests"));
        assert!(html.contains("Speed Statistics"));
        assert!(html.contains("Recent Test Results"));
        assert!(html.contains("failure #3"));
        assert!(html.contains("Success rate: 75.00%"));
        assert!(html.contains("75.0%"));
        assert_eq!(row_count(&html), 4);
    }

    #[test]
    fn test_results_window_is_last_fifty_in_order() {
        let store = store_with(60);
        let report = build_report(&store, &target(), base_time());

        assert_eq!(report.metadata.total_results, 60);
        assert_eq!(report.metadata.shown_results, 50);
        assert_eq!(report.results.len(), 50);
        assert_eq!(report.results[0].timestamp(), base_time() + Duration::minutes(10));
        assert_eq!(report.results[49].timestamp(), base_time() + Duration::minutes(59));
        assert_eq!(report.summary.total, 60);

        let html = generate_html_report(&report);
        assert_eq!(row_count(&html), 50);
    }

    #[test]
    fn test_render_is_idempotent() {
        let store = store_with(12);
        let writer = ReportWriter::new(PathBuf::from("report.html"), ReportFormat::Html, target());

        let first = writer.render(&store, base_time()).unwrap();
        let second = writer.render(&store, base_time()).unwrap();
        assert_eq!(first, second);

        let later = writer
            .render(&store, base_time() + Duration::hours(3))
            .unwrap();
        let differing: Vec<_> = first
            .lines()
            .zip(later.lines())
            .filter(|(a, b)| a != b)
            .collect();
        assert_eq!(differing.len(), 1);
        assert!(differing[0].0.contains("Generated:"));
    }

    #[test]
    fn test_report_without_successes() {
        let mut store = ResultStore::new();
        store.append(Measurement::failure(base_time(), "connection refused"));
        let html = generate_html_report(&build_report(&store, &target(), base_time()));

        assert!(html.contains("<tr><td>Average</td><td>0.00</td><td>0.00</td></tr>"));
        assert!(html.contains("connection refused"));
    }

    #[test]
    fn test_error_text_is_escaped() {
        let mut store = ResultStore::new();
        store.append(Measurement::failure(base_time(), "<script>alert('x')</script>"));
        let html = generate_html_report(&build_report(&store, &target(), base_time()));

        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;"));
    }

    #[test]
    fn test_generate_json_report() {
        let store = store_with(3);
        let json = generate_json_report(&build_report(&store, &target(), base_time())).unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["metadata"]["target"], "speedtest.init7.net:5201");
        assert_eq!(value["summary"]["total"], 3);
        assert_eq!(value["results"].as_array().map(|r| r.len()), Some(3));
    }

    #[test]
    fn test_write_replaces_existing_report() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("iperf_speed_report.html");
        std::fs::write(&path, "old report that is much longer than nothing").unwrap();

        let writer = ReportWriter::new(path.clone(), ReportFormat::Html, target());
        writer.write(&store_with(2)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("<!DOCTYPE html>"));
        assert!(!content.contains("old report"));
        assert_eq!(writer.path(), path.as_path());

        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_write_into_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("report.html");
        let writer = ReportWriter::new(path, ReportFormat::Html, target());

        assert!(matches!(writer.write(&store_with(1)), Err(ReportError::Io(_))));
    }
}
