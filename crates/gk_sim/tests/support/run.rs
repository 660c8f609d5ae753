#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use gk_sim::clock::SteppedWallClock;
use gk_sim::config::LocationConfig;
use gk_sim::runner::{run_location, LocationRun, RunOptions};
use gk_sim::test_helpers::{test_config, test_geography};
use gk_sim::writer::MemorySink;

/// Options whose wall clock advances only when the runner sleeps.
pub fn stepped_options() -> RunOptions {
    RunOptions {
        wall_clock: Arc::new(SteppedWallClock::new()),
        ..RunOptions::default()
    }
}

/// Same as [`stepped_options`] with a live-phase budget.
pub fn stepped_options_with_budget(budget: Duration) -> RunOptions {
    RunOptions {
        max_wall: Some(budget),
        ..stepped_options()
    }
}

/// Sample config with a fixed daily volume and no noise.
pub fn flat_demand_config(orders: f64, anchor: &str) -> LocationConfig {
    let mut config = test_config();
    config.demand.orders_day_1 = orders;
    config.demand.orders_last = orders;
    config.demand.noise_pct = 0.0;
    config.simulation.anchor = Some(anchor.parse().expect("anchor"));
    config
}

/// Runs `config` on the sample grid into a memory sink.
pub fn run_in_memory(config: &LocationConfig, options: &RunOptions) -> (LocationRun, MemorySink) {
    let sink = MemorySink::new();
    let run = run_location(config, test_geography(), Box::new(sink.clone()), options)
        .expect("location run");
    (run, sink)
}
