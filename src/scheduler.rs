//! Measurement scheduler.
//!
//! Runs the probe every interval until the session duration is used up or
//! the operator cancels, recording each result and refreshing the report.

use crate::analysis::{aggregate, headline};
use crate::config::RunConfig;
use crate::measure::ThroughputProbe;
use crate::models::Measurement;
use crate::persist::ResultLog;
use crate::report::{ReportError, ReportWriter};
use crate::store::ResultStore;
use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A report is refreshed every this many measurements.
pub const REPORT_EVERY: usize = 10;

/// Delay before retrying after an iteration fault.
pub const FAULT_BACKOFF: Duration = Duration::from_secs(10);

/// Lifecycle of a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopping,
    Terminated,
}

/// Faults inside an iteration that are not measurement failures.
#[derive(Debug, Error)]
pub enum IterationError {
    #[error("failed to append to result log: {0}")]
    Persist(#[source] std::io::Error),

    #[error("failed to render report: {0}")]
    Report(#[source] ReportError),
}

/// Counters describing a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub iterations: usize,
    pub successes: usize,
    pub failures: usize,
    pub reports_written: usize,
    pub faults: usize,
}

/// Whether a report should be rendered after the `count`-th measurement.
pub fn report_due(count: usize, last_failed: bool) -> bool {
    last_failed || (count > 0 && count % REPORT_EVERY == 0)
}

/// Drives measurements and the result pipeline for one target.
pub struct Scheduler<P> {
    config: RunConfig,
    probe: P,
    store: ResultStore,
    log: ResultLog,
    reporter: ReportWriter,
    state: SchedulerState,
    started: Option<Instant>,
    show_progress: bool,
    summary: RunSummary,
}

impl<P: ThroughputProbe> Scheduler<P> {
    pub fn new(config: RunConfig, probe: P, log: ResultLog, reporter: ReportWriter) -> Self {
        Self {
            config,
            probe,
            store: ResultStore::new(),
            log,
            reporter,
            state: SchedulerState::Idle,
            started: None,
            show_progress: false,
            summary: RunSummary::default(),
        }
    }

    /// Show a spinner while each measurement runs.
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Time left in a bounded session, `None` for continuous runs.
    pub fn remaining(&self) -> Option<Duration> {
        let duration = self.config.duration?;
        let elapsed = self.started.map(|s| s.elapsed()).unwrap_or_default();
        Some(duration.saturating_sub(elapsed))
    }

    /// Whether another iteration may start.
    fn should_continue(&self) -> bool {
        match (self.config.duration, self.started) {
            (None, _) => true,
            (Some(duration), Some(started)) => started.elapsed() < duration,
            (Some(_), None) => true,
        }
    }

    /// Run until the duration elapses or `cancel` fires, then write the final report.
    pub async fn run(mut self, cancel: CancellationToken) -> RunSummary {
        self.state = SchedulerState::Running;
        self.started = Some(Instant::now());
        info!(
            "Scheduler started for {}:{} (interval {:?}, duration {:?})",
            self.config.server, self.config.port, self.config.interval, self.config.duration
        );

        while self.state == SchedulerState::Running {
            if !self.should_continue() {
                info!("Test duration reached");
                self.state = SchedulerState::Stopping;
                break;
            }
            if cancel.is_cancelled() {
                info!("Cancellation requested");
                self.state = SchedulerState::Stopping;
                break;
            }

            let delay = match self.run_iteration().await {
                Ok(()) => self.next_delay(),
                Err(e) => {
                    match &e {
                        IterationError::Persist(_) => error!("Result not persisted: {}", e),
                        IterationError::Report(_) => error!("Report not updated: {}", e),
                    }
                    println!("❌ Unexpected error: {}", e);
                    self.summary.faults += 1;
                    FAULT_BACKOFF
                }
            };
            if let Some(remaining) = self.remaining() {
                println!("⏳ Time remaining: {}", format_duration(remaining));
            }

            if !wait_or_cancel(delay, &cancel).await {
                info!("Cancelled while waiting for the next test");
                self.state = SchedulerState::Stopping;
            }
        }

        self.finish();
        self.summary
    }

    /// One measurement: probe, store, log, and maybe report.
    async fn run_iteration(&mut self) -> Result<(), IterationError> {
        let spinner = self.show_progress.then(start_spinner);
        let measurement = self.probe.measure().await;
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }

        self.summary.iterations += 1;
        if measurement.is_success() {
            self.summary.successes += 1;
        } else {
            self.summary.failures += 1;
        }
        print_result(&measurement);

        let failed = !measurement.is_success();
        let recorded = self.store.append(measurement);
        let persisted = self.log.write(recorded);

        // The measurement is in the store either way, so the trigger still applies.
        let reported = if report_due(self.store.count(), failed) {
            self.write_report()
        } else {
            Ok(())
        };

        match (persisted, reported) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(e), reported) => {
                if let Err(report_err) = reported {
                    error!("Report not updated: {}", report_err);
                }
                Err(IterationError::Persist(e))
            }
            (Ok(()), Err(e)) => Err(IterationError::Report(e)),
        }
    }

    /// Interval to wait before the next iteration, cut short at the end of a bounded run.
    fn next_delay(&self) -> Duration {
        match self.remaining() {
            Some(remaining) => self.config.interval.min(remaining),
            None => self.config.interval,
        }
    }

    fn write_report(&mut self) -> Result<(), ReportError> {
        self.reporter.write(&self.store)?;
        self.summary.reports_written += 1;
        debug!("{}", headline(&aggregate(self.store.snapshot())));
        Ok(())
    }

    /// Stopping: one final report, then terminate.
    fn finish(&mut self) {
        self.state = SchedulerState::Stopping;
        if let Err(e) = self.write_report() {
            error!("Final report not written: {}", e);
        }
        self.state = SchedulerState::Terminated;
        debug!("Scheduler {:?}", self.state());
        if let Some(last) = self.store.last() {
            debug!("Last test finished at {}", last.timestamp());
        }
        info!(
            "Scheduler stopped after {} tests ({} ok, {} failed)",
            self.summary.iterations, self.summary.successes, self.summary.failures
        );
    }
}

/// Sleep for `delay` unless cancelled first. Returns `false` on cancellation.
async fn wait_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }

    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

fn start_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message("Running speed test...");
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

/// Console line for one measurement.
fn print_result(measurement: &Measurement) {
    let time = measurement.timestamp().with_timezone(&Local).format("%H:%M:%S");

    match (measurement.throughput(), measurement.error()) {
        (Some(t), _) => println!(
            "⚡ {} | Upload: {:6.2} Mbps | Download: {:6.2} Mbps",
            time, t.upload_mbps, t.download_mbps
        ),
        (None, error) => println!("❌ {} | Test failed: {}", time, error.unwrap_or_default()),
    }
}

/// Format a duration as `1h 02m 03s`, `4m 05s` or `6s`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
