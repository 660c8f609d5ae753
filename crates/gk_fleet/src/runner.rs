//! Parallel location execution using rayon.
//!
//! Locations share nothing mutable: each run builds its own world, RNG and
//! writer. A location that fails (geography unavailable, writer retries
//! exhausted) is reported and the others carry on.

use std::io;

use gk_sim::config::LocationConfig;
use gk_sim::event::EventRecord;
use gk_sim::runner::{run_location_from_config, LocationRun, RunOptions, SimError};
use gk_sim::writer::WriterError;
use gk_sim::writer::{DirectorySink, EventSink};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{error, info};

use crate::selection::OutputTarget;

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("failed to create thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Clone)]
pub struct FleetOptions {
    /// Worker threads; rayon's default when `None`.
    pub threads: Option<usize>,
    pub show_progress: bool,
    pub run: RunOptions,
}

impl Default for FleetOptions {
    fn default() -> Self {
        Self {
            threads: None,
            show_progress: true,
            run: RunOptions::default(),
        }
    }
}

/// A location that did not complete.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationFailure {
    pub location: String,
    pub error: String,
    /// Events that were produced but never reached the output, in emission
    /// order.
    pub unflushed: Vec<EventRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct FleetReport {
    /// Completed runs, in selection order.
    pub runs: Vec<LocationRun>,
    pub failures: Vec<LocationFailure>,
}

impl FleetReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs every config, writing each location's batches under `target`.
pub fn run_fleet(
    configs: &[LocationConfig],
    target: &OutputTarget,
    options: &FleetOptions,
) -> Result<FleetReport, FleetError> {
    run_fleet_with_sinks(
        configs,
        |config| {
            let sink = DirectorySink::new(target.location_dir(&config.location_name))?;
            Ok(Box::new(sink) as Box<dyn EventSink>)
        },
        options,
    )
}

/// Runs every config in parallel with sinks from `make_sink`.
pub fn run_fleet_with_sinks<F>(
    configs: &[LocationConfig],
    make_sink: F,
    options: &FleetOptions,
) -> Result<FleetReport, FleetError>
where
    F: Fn(&LocationConfig) -> io::Result<Box<dyn EventSink>> + Sync,
{
    let total = configs.len();
    let pb = if options.show_progress && total > 0 {
        let bar = ProgressBar::new(total as u64);
        let style = ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
            )
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        Some(bar)
    } else {
        None
    };

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(threads) = options.threads {
        builder = builder.num_threads(threads);
    }
    let pool = builder.build()?;

    let pb_clone = pb.clone();
    let outcomes: Vec<Result<LocationRun, LocationFailure>> = pool.install(|| {
        configs
            .par_iter()
            .map(|config| {
                let outcome = run_one(config, &make_sink, &options.run);
                if let Some(ref progress_bar) = pb_clone {
                    progress_bar.set_message(config.location_name.clone());
                    progress_bar.inc(1);
                }
                outcome
            })
            .collect()
    });

    if let Some(ref progress_bar) = pb {
        progress_bar.finish_with_message("Completed");
    }

    let mut report = FleetReport::default();
    for outcome in outcomes {
        match outcome {
            Ok(run) => report.runs.push(run),
            Err(failure) => report.failures.push(failure),
        }
    }
    info!(
        completed = report.runs.len(),
        failed = report.failures.len(),
        "fleet finished"
    );
    Ok(report)
}

fn run_one<F>(
    config: &LocationConfig,
    make_sink: &F,
    options: &RunOptions,
) -> Result<LocationRun, LocationFailure>
where
    F: Fn(&LocationConfig) -> io::Result<Box<dyn EventSink>> + Sync,
{
    let location = config.location_name.clone();
    let sink = make_sink(config).map_err(|err| {
        error!(location = %location, error = %err, "cannot open output");
        LocationFailure {
            location: location.clone(),
            error: format!("cannot open output: {err}"),
            unflushed: Vec::new(),
        }
    })?;
    run_location_from_config(config, sink, options).map_err(|err| {
        let error = err.to_string();
        let unflushed = match err {
            SimError::Writer(WriterError::RetriesExhausted { pending, .. }) => pending,
            _ => Vec::new(),
        };
        error!(
            location = %location,
            error = %error,
            unflushed_events = unflushed.len(),
            "location failed"
        );
        LocationFailure {
            location,
            error,
            unflushed,
        }
    })
}
