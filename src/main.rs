//! Uptime Monitor - HTTP site monitoring with scheduled reports
//!
//! Probes each configured site at a fixed rate, appends the results to
//! rotating per-site CSV files, and measures them into reports on demand or
//! on a weekly or monthly schedule.

mod config;
mod measure;
mod probe;
mod report;
mod scheduler;
mod store;

use config::AppConfig;
use measure::{FocusInterval, MeasurementEngine};
use report::{Format, FormatOptions, FormatterRegistry, ReportGenerator};
use scheduler::Scheduler;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser)]
#[command(name = "uptime-monitor", version, about)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    /// Do not read commands from stdin
    #[arg(long, global = true)]
    no_cli: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Probe all sites and run scheduled reports (default)
    Run,
    /// Measure one site and print the result
    Measure(MeasureArgs),
    /// Generate every configured report once
    GenerateReports,
}

#[derive(Args)]
struct MeasureArgs {
    site: String,

    /// First day to include (YYYY-MM-DD)
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Last day to include (YYYY-MM-DD)
    #[arg(long)]
    end: Option<NaiveDate>,

    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Daily time range, e.g. 09:00-17:00. May be repeated.
    #[arg(long = "focus")]
    focus: Vec<FocusInterval>,

    /// Include every entry in PDF output
    #[arg(long)]
    entries: bool,

    /// Write to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("uptime_monitor=info".parse()?))
        .init();

    let cli = Cli::parse();
    let cfg = AppConfig::load(&cli.config)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(cfg, cli.no_cli).await,
        Command::Measure(args) => measure(cfg, args).await,
        Command::GenerateReports => generate_reports(cfg).await,
    }
}

async fn run(cfg: AppConfig, no_cli: bool) -> Result<(), BoxError> {
    let max_file_size = cfg.max_file_size_bytes()?;
    tracing::info!(
        "Starting Uptime Monitor with {} sites, data in {}",
        cfg.sites.len(),
        cfg.data_dir.display()
    );

    let scheduler = Scheduler::new().await?;
    for site in &cfg.sites {
        if let Err(e) = scheduler.add_site(site, &cfg.data_dir, max_file_size).await {
            tracing::error!("Not monitoring {}: {}", site.name, e);
        }
    }

    for report in &cfg.reports {
        let generator = match ReportGenerator::from_config(&cfg, report) {
            Ok(g) => g,
            Err(e) => {
                tracing::error!("Skipping report: {}", e);
                continue;
            }
        };
        match generator.job().interval {
            Some(interval) => {
                if let Err(e) = scheduler.add_report(Arc::new(generator), interval).await {
                    tracing::error!("Not scheduling report {}: {}", report.name, e);
                }
            }
            None => tracing::info!("Report {} has no interval; run it with generate-reports", report.name),
        }
    }

    scheduler.start().await?;
    tracing::info!("Monitoring: {}", scheduler.site_names().await.join(", "));
    tracing::info!("Scheduled reports: {}", scheduler.report_names().await.join(", "));
    if !no_cli {
        tracing::info!("Type \"stop\" to shut down");
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("Received Ctrl-C"),
        _ = terminate() => tracing::info!("Received SIGTERM"),
        _ = stop_command(), if !no_cli => tracing::info!("Received stop command"),
    }

    scheduler.shutdown().await?;
    Ok(())
}

/// Resolves when a line reading "stop" arrives on stdin.
async fn stop_command() {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().eq_ignore_ascii_case("stop") => return,
            Ok(Some(line)) => {
                if !line.trim().is_empty() {
                    tracing::warn!("Unknown command: {}", line.trim());
                }
            }
            // No more input; only signals can stop us now
            Ok(None) | Err(_) => std::future::pending::<()>().await,
        }
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sig) => {
            sig.recv().await;
        }
        Err(e) => {
            tracing::warn!("Cannot listen for SIGTERM: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await
}

async fn measure(cfg: AppConfig, args: MeasureArgs) -> Result<(), BoxError> {
    tokio::task::spawn_blocking(move || -> Result<(), BoxError> {
        let engine = MeasurementEngine::new(cfg.data_dir);
        let data = engine.measure(&args.site, args.start, args.end, &args.focus)?;

        let registry = FormatterRegistry::new(FormatOptions {
            include_entries: args.entries,
        });
        let formatter = registry
            .get(args.format)
            .ok_or_else(|| format!("no formatter for {}", args.format))?;

        match args.output {
            Some(path) => {
                let mut out = BufWriter::new(File::create(&path)?);
                formatter.write(&data, &mut out)?;
                out.flush()?;
                tracing::info!("Wrote {}", path.display());
            }
            None => {
                let stdout = std::io::stdout();
                let mut out = stdout.lock();
                formatter.write(&data, &mut out)?;
            }
        }
        Ok(())
    })
    .await?
}

async fn generate_reports(cfg: AppConfig) -> Result<(), BoxError> {
    let total = cfg.reports.len();
    let mut failed = 0usize;

    for report in &cfg.reports {
        let generator = match ReportGenerator::from_config(&cfg, report) {
            Ok(g) => g,
            Err(e) => {
                tracing::error!("Skipping report: {}", e);
                failed += 1;
                continue;
            }
        };

        match tokio::task::spawn_blocking(move || generator.generate()).await? {
            Ok(outcome) => {
                tracing::info!("Report {} written to {}", report.name, outcome.archive.display());
                for (site, status) in &outcome.sites {
                    tracing::info!("  {}: {:?}", site, status);
                }
            }
            Err(e) => {
                tracing::error!("Report {} failed: {}", report.name, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(format!("{} of {} reports failed", failed, total).into());
    }
    Ok(())
}
