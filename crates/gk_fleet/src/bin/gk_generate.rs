use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use gk_fleet::{
    export_to_csv, export_to_json, export_to_parquet, export_unflushed_events, resolve_configs,
    run_fleet, summarize, FleetOptions, LocationSelection, OutputTarget,
};
use gk_sim::clock::StopSignal;
use gk_sim::runner::RunOptions;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "gk-generate",
    about = "Generate ghost-kitchen order lifecycle events",
    long_about = "Simulates one or more ghost-kitchen locations and writes their order\n\
                  events as NDJSON batches under <output-root>/<catalog>/<schema>/<volume>/<location>/."
)]
struct Cli {
    /// `all`, or a comma-separated list of location names
    #[arg(long, default_value = "all", env = "GK_LOCATIONS")]
    locations: LocationSelection,
    /// Directory holding one `<location>.json` config per location
    #[arg(long, default_value = "configs", env = "GK_CONFIG_DIR")]
    config_dir: PathBuf,
    /// Root of the output volume tree
    #[arg(long, env = "GK_OUTPUT_ROOT")]
    output_root: PathBuf,
    #[arg(long, env = "GK_CATALOG")]
    catalog: String,
    #[arg(long, env = "GK_SCHEMA")]
    schema: String,
    #[arg(long, env = "GK_VOLUME")]
    volume: String,
    /// Worker threads (defaults to the number of CPUs)
    #[arg(long)]
    threads: Option<usize>,
    /// Stop the live phase after this many real seconds
    #[arg(long)]
    duration_secs: Option<u64>,
    /// Write run summaries (JSON, CSV, Parquet) into this directory
    #[arg(long)]
    summary_dir: Option<PathBuf>,
    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Ctrl-C raises `stop`; running locations drain their writers and return.
/// A second Ctrl-C after the first is ignored while the drain finishes.
fn install_stop_handler(stop: &StopSignal) -> Result<()> {
    let stop = stop.clone();
    ctrlc::set_handler(move || {
        if !stop.is_stopped() {
            warn!("interrupt received, stopping after the writers drain");
            stop.stop();
        }
    })
    .context("installing the Ctrl-C handler")
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let target = OutputTarget::new(&cli.output_root, &cli.catalog, &cli.schema, &cli.volume);
    target.validate()?;
    let configs = resolve_configs(&cli.config_dir, &cli.locations)
        .with_context(|| format!("loading configs from {}", cli.config_dir.display()))?;
    info!(
        locations = configs.len(),
        output = %target.volume_dir().display(),
        "starting generation"
    );

    let stop = StopSignal::new();
    install_stop_handler(&stop)?;
    let options = FleetOptions {
        threads: cli.threads,
        show_progress: !cli.no_progress,
        run: RunOptions {
            stop,
            max_wall: cli.duration_secs.map(Duration::from_secs),
            ..RunOptions::default()
        },
    };
    let report = run_fleet(&configs, &target, &options)?;

    let summaries: Vec<_> = report.runs.iter().map(summarize).collect();
    for summary in &summaries {
        info!(
            location = %summary.location,
            orders = summary.orders_admitted,
            skipped = summary.orders_skipped,
            events = summary.events_emitted,
            flushes = summary.flushes,
            p50 = summary.p50_total_minutes,
            p99 = summary.p99_total_minutes,
            "location summary"
        );
    }

    if let Some(dir) = &cli.summary_dir {
        if !summaries.is_empty() {
            export_to_json(&summaries, dir.join("run_summary.json"))
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            export_to_csv(&summaries, dir.join("run_summary.csv"))
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            export_to_parquet(&summaries, dir.join("run_summary.parquet"))
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            info!(dir = %dir.display(), "run summary exported");
        }
    }

    for failure in &report.failures {
        error!(
            location = %failure.location,
            unflushed_events = failure.unflushed.len(),
            "{}",
            failure.error
        );
        if failure.unflushed.is_empty() {
            continue;
        }
        let path = target.recovery_file(&failure.location);
        match export_unflushed_events(&failure.unflushed, &path) {
            Ok(()) => info!(
                location = %failure.location,
                events = failure.unflushed.len(),
                path = %path.display(),
                "unflushed events saved for recovery"
            ),
            Err(e) => error!(
                location = %failure.location,
                path = %path.display(),
                error = %e,
                "could not save unflushed events"
            ),
        }
    }
    if !report.is_success() {
        bail!(
            "{} of {} location(s) failed",
            report.failures.len(),
            configs.len()
        );
    }
    Ok(())
}
