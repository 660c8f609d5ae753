mod support;

use std::io;
use std::sync::Arc;

use gk_sim::clock::SteppedWallClock;
use gk_sim::event::EventRecord;
use gk_sim::runner::{run_location, RunOptions, SimError};
use gk_sim::test_helpers::{test_config, test_geography};
use gk_sim::writer::{EncodedBatch, EventSink, MemorySink, WriterError};
use support::records::sink_records;
use support::run::flat_demand_config;

/// Accepts `healthy` batches into `written`, then fails forever.
struct FailingSink {
    healthy: usize,
    written: MemorySink,
}

impl FailingSink {
    fn new(healthy: usize) -> Self {
        Self {
            healthy,
            written: MemorySink::new(),
        }
    }
}

impl EventSink for FailingSink {
    fn write_batch(&mut self, batch: &EncodedBatch) -> io::Result<()> {
        if self.healthy == 0 {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "volume read-only"));
        }
        self.healthy -= 1;
        self.written.write_batch(batch)
    }
}

fn stepped() -> RunOptions {
    RunOptions {
        wall_clock: Arc::new(SteppedWallClock::new()),
        ..RunOptions::default()
    }
}

fn pending_of(err: SimError) -> (u32, Vec<EventRecord>) {
    match err {
        SimError::Writer(WriterError::RetriesExhausted {
            attempts, pending, ..
        }) => (attempts, pending),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn exhausted_retries_abort_the_location_with_pending_events() {
    let mut config = test_config();
    config.batching.batch_rows = 10;
    config.batching.max_retries = 2;
    config.batching.retry_backoff_ms = 1;

    let err = run_location(
        &config,
        test_geography(),
        Box::new(FailingSink::new(1)),
        &stepped(),
    )
    .expect_err("writer must fail");

    let (attempts, pending) = pending_of(err);
    assert_eq!(attempts, 3);
    assert!(pending.len() >= 10);
    assert!(pending.iter().all(|r| r.location == config.location_name));
}

#[test]
fn pending_events_continue_exactly_where_the_sink_stopped() {
    let mut config = test_config();
    config.batching.batch_rows = 10;
    config.batching.max_retries = 1;
    config.batching.retry_backoff_ms = 1;

    let complete = MemorySink::new();
    run_location(&config, test_geography(), Box::new(complete.clone()), &stepped())
        .expect("healthy run");
    let full_stream = sink_records(&complete);

    let sink = FailingSink::new(2);
    let written = sink.written.clone();
    let err = run_location(&config, test_geography(), Box::new(sink), &stepped())
        .expect_err("writer must fail");
    let (_, pending) = pending_of(err);

    let mut recovered = sink_records(&written);
    assert_eq!(recovered.len(), 20);
    recovered.extend(pending);
    assert!(recovered.len() > 20);
    assert!(recovered.len() <= full_stream.len());
    let ids: Vec<_> = recovered.iter().map(|r| r.event_id).collect();
    let expected: Vec<_> = full_stream[..recovered.len()].iter().map(|r| r.event_id).collect();
    assert_eq!(ids, expected);
}

#[test]
fn backlog_reaches_the_writer_while_it_is_generated() {
    // Three busy lookback days hold well over 80k events. The writer fails on
    // its first batch, so only a streamed backlog stops early.
    let mut config = flat_demand_config(3_650.0, "2024-01-04T00:00:00Z");
    config.simulation.start_days_ago = 3;
    config.simulation.end_days_ahead = 0;
    config.batching.batch_rows = 10;
    config.batching.max_retries = 0;

    let err = run_location(
        &config,
        test_geography(),
        Box::new(FailingSink::new(0)),
        &stepped(),
    )
    .expect_err("writer must fail");
    let (attempts, pending) = pending_of(err);
    assert_eq!(attempts, 1);
    assert!(pending.len() >= 10);
    assert!(pending.len() < 40_000, "{} events produced after the failure", pending.len());
}
