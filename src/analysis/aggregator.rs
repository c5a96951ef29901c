//! Measurement aggregation and statistics.
//!
//! This module turns a snapshot of the result store into the summary
//! figures shown in reports and on the console.

use crate::models::{Measurement, ThroughputSummary};

/// Compute summary statistics over a snapshot of measurements.
///
/// Bitrate statistics only consider successful attempts. With no successes
/// every numeric field stays at zero.
pub fn aggregate(results: &[Measurement]) -> ThroughputSummary {
    let mut summary = ThroughputSummary {
        total: results.len(),
        ..ThroughputSummary::default()
    };

    let successes: Vec<_> = results.iter().filter_map(|m| m.throughput()).collect();
    summary.success_count = successes.len();
    summary.fail_count = summary.total - summary.success_count;

    if summary.total > 0 {
        summary.success_rate = summary.success_count as f64 / summary.total as f64 * 100.0;
    }

    if successes.is_empty() {
        return summary;
    }

    let count = successes.len() as f64;
    summary.avg_upload = successes.iter().map(|t| t.upload_mbps).sum::<f64>() / count;
    summary.avg_download = successes.iter().map(|t| t.download_mbps).sum::<f64>() / count;

    summary.max_upload = successes.iter().map(|t| t.upload_mbps).fold(f64::MIN, f64::max);
    summary.max_download = successes.iter().map(|t| t.download_mbps).fold(f64::MIN, f64::max);
    summary.min_upload = successes.iter().map(|t| t.upload_mbps).fold(f64::MAX, f64::min);
    summary.min_download = successes.iter().map(|t| t.download_mbps).fold(f64::MAX, f64::min);

    summary
}

/// Headline text for the console, e.g. `8/10 ok (80.0%)`.
pub fn headline(summary: &ThroughputSummary) -> String {
    format!(
        "{}/{} ok ({:.1}%) | avg ↑{:.1} Mbps ↓{:.1} Mbps",
        summary.success_count,
        summary.total,
        summary.success_rate,
        summary.avg_upload,
        summary.avg_download
    )
}
