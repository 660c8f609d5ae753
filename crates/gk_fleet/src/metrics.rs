//! Run summary metrics.
//!
//! Durations come from delivered orders: prep is `created → ready`, delivery
//! is `ready → delivered`, total is `created → delivered`. The total
//! percentiles are the delivery-time bands downstream refund scoring uses.

use gk_sim::runner::LocationRun;
use serde::Serialize;

/// Aggregated metrics from a single location run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationSummary {
    pub location: String,
    pub window_start: String,
    pub days_simulated: u32,
    pub orders_admitted: u64,
    /// Orders dropped because no routable customer was found.
    pub orders_skipped: u64,
    pub orders_delivered: u64,
    pub events_emitted: u64,
    pub flushes: u64,
    pub writer_retries: u64,
    pub fields_corrupted: u64,
    pub avg_prep_minutes: f64,
    pub avg_delivery_minutes: f64,
    pub avg_total_minutes: f64,
    pub p50_total_minutes: f64,
    pub p75_total_minutes: f64,
    pub p99_total_minutes: f64,
    pub stop_reason: String,
}

impl LocationSummary {
    /// Average and the P50/P75/P99 of `values`.
    fn calculate_stats(values: &[f64]) -> (f64, f64, f64, f64) {
        if values.is_empty() {
            return (0.0, 0.0, 0.0, 0.0);
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let avg = sorted.iter().sum::<f64>() / sorted.len() as f64;
        // floor(q * (n-1)), nearest-rank below
        let at = |q: f64| sorted[(((sorted.len() - 1) as f64 * q) as usize).min(sorted.len() - 1)];

        (avg, at(0.50), at(0.75), at(0.99))
    }

    fn mean(values: impl Iterator<Item = f64>) -> f64 {
        let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
        if n == 0 {
            0.0
        } else {
            sum / n as f64
        }
    }
}

/// Extract the summary of a completed location run.
pub fn summarize(run: &LocationRun) -> LocationSummary {
    let delivered = &run.telemetry.delivered_orders;
    let totals: Vec<f64> = delivered.iter().map(|o| o.total_minutes).collect();
    let (avg_total, p50, p75, p99) = LocationSummary::calculate_stats(&totals);

    LocationSummary {
        location: run.location.clone(),
        window_start: run.window_start.to_string(),
        days_simulated: run.telemetry.days_simulated,
        orders_admitted: run.telemetry.orders_admitted,
        orders_skipped: run.telemetry.orders_skipped,
        orders_delivered: run.telemetry.orders_delivered,
        events_emitted: run.telemetry.events_emitted,
        flushes: run.writer.flushes,
        writer_retries: run.writer.retries,
        fields_corrupted: run.fields_corrupted,
        avg_prep_minutes: LocationSummary::mean(delivered.iter().map(|o| o.prep_minutes)),
        avg_delivery_minutes: LocationSummary::mean(delivered.iter().map(|o| o.delivery_minutes)),
        avg_total_minutes: avg_total,
        p50_total_minutes: p50,
        p75_total_minutes: p75,
        p99_total_minutes: p99,
        stop_reason: format!("{:?}", run.stop_reason),
    }
}
