//! iperf-monitor - periodic iperf3 throughput monitor
//!
//! Runs an iperf3 client test against one server at a fixed interval,
//! logs every result and keeps a rolling report of recent tests.
//!
//! Exit codes:
//!   0 - Monitoring finished (duration reached or interrupted)
//!   1 - Startup error (invalid configuration, iperf3 missing, unwritable files)

mod analysis;
mod cli;
mod config;
mod measure;
mod models;
mod persist;
mod report;
mod scheduler;
mod store;

use anyhow::{Context, Result};
use cli::Args;
use config::Config;
use measure::IperfProbe;
use persist::ResultLog;
use report::ReportWriter;
use scheduler::{format_duration, Scheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("iperf-monitor v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if let Err(e) = run_monitor(args).await {
        error!("Monitor failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .iperf-monitor.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(config::CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            config::CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", config::CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", config::CONFIG_FILE_NAME);
    println!("   Edit it to set the server, interval, duration and output files.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
///
/// `RUST_LOG` overrides the level chosen by --verbose/--quiet.
fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level().to_string().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Resolve configuration, run the scheduler until it stops.
async fn run_monitor(args: Args) -> Result<()> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    let run_config = config.resolve().context("Invalid configuration")?;

    if !measure::check_installed(&config.tool.program).await {
        measure::print_install_instructions();
        anyhow::bail!("Cannot run {}", config.tool.program);
    }

    let log = ResultLog::open(&config.output.log_file)?;
    let reporter = ReportWriter::new(
        config.output.report_file.clone(),
        config.output.format,
        run_config.target(),
    );
    let probe = IperfProbe::new(run_config.target(), config.tool.program.clone())
        .with_extra_args(config.tool.extra_args.clone());

    println!("🚀 IPERF Speed Test Monitor");
    println!("{}", "=".repeat(50));
    println!("📊 Testing against: {}", run_config.target());
    println!(
        "⏱️  Test interval: {}",
        format_duration(run_config.interval)
    );
    match run_config.duration {
        Some(duration) => println!("⌛ Test duration: {}", format_duration(duration)),
        None => println!("⌛ Test duration: continuous"),
    }
    println!("📝 Logging to: {}", log.path().display());
    println!("📄 Report will be saved to: {}", reporter.path().display());
    println!("\nPress Ctrl+C to stop\n");

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let report_path = reporter.path().to_path_buf();
    let summary = Scheduler::new(run_config, probe, log, reporter)
        .with_progress(args.show_progress())
        .run(cancel)
        .await;

    println!("\n📄 Final report saved to: {}", report_path.display());
    println!(
        "   Tests: {} | ✅ {} | ❌ {} | Reports: {}",
        summary.iterations, summary.successes, summary.failures, summary.reports_written
    );
    if summary.faults > 0 {
        warn!("{} iterations hit a logging or report fault", summary.faults);
    }
    println!("👋 Speed testing stopped.");

    Ok(())
}

/// Cancel the scheduler on Ctrl+C.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                println!("\n\n🛑 Stopping speed tests...");
                cancel.cancel();
            }
            Err(e) => warn!("Cannot listen for Ctrl+C: {}", e),
        }
    });
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", config::CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
