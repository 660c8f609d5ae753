//! Simulation runner: advances the clock, routes events into the ECS and
//! hands emitted events to the writer.
//!
//! Clock progression and event routing happen here, outside systems. Each step
//! pops the next event from [SimulationClock], inserts it as [CurrentEvent],
//! then runs the schedule. A location run has two phases: the backlog (every
//! event up to the anchor, produced without delay) and the live phase (events
//! released as accelerated wall-clock time reaches them).

use std::sync::Arc;
use std::time::Duration;

use bevy_ecs::prelude::Res;
use bevy_ecs::prelude::{Schedule, World};
use bevy_ecs::schedule::{apply_deferred, ExecutorKind, IntoSystemConfigs};
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::clock::{
    CurrentEvent, EventKind, Pacing, SimulationClock, StopSignal, SystemWallClock, WallClock,
};
use crate::config::{ConfigError, LocationConfig};
use crate::corruption::FieldCorruptor;
use crate::ecs::Outbox;
use crate::event::{EventRecord, OrderEvent};
use crate::geography::{load_geography, Geography, GeographyError};
use crate::scenario::{build_location, SimulationWindow};
use crate::systems::{
    day_started::day_started_system, emit_stage::emit_stage_system,
    order_arrival::order_arrival_system,
};
use crate::telemetry::SimTelemetry;
use crate::writer::{BatchWriter, EventSink, WriterError, WriterSettings, WriterStats};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
/// Shortest live-phase sleep, so the loop always makes wall-clock progress.
const MIN_SLEEP: Duration = Duration::from_millis(1);

fn is_day_started(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::DayStarted)
        .unwrap_or(false)
}

fn is_order_arrival(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::OrderArrival)
        .unwrap_or(false)
}

fn is_emit_stage(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::EmitStage)
        .unwrap_or(false)
}

/// Builds the simulation schedule: the three event-reacting systems plus
/// [apply_deferred] so spawned orders exist before their first `EmitStage`.
///
/// Every system draws from the location RNG, so the schedule runs single
/// threaded to keep draws in a fixed order.
pub fn simulation_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.set_executor_kind(ExecutorKind::SingleThreaded);
    schedule.add_systems(
        (
            day_started_system.run_if(is_day_started),
            order_arrival_system.run_if(is_order_arrival),
            emit_stage_system.run_if(is_emit_stage),
            apply_deferred,
        )
            .chain(),
    );
    schedule
}

/// Runs one simulation step if the next event is due at or before
/// `until_ms`. Returns `true` if an event was processed.
pub fn run_next_event(world: &mut World, schedule: &mut Schedule, until_ms: u64) -> bool {
    let next_ts = world
        .get_resource::<SimulationClock>()
        .and_then(|c| c.next_event_time());
    match next_ts {
        Some(ts) if ts <= until_ms => {}
        _ => return false,
    }

    let event = match world.resource_mut::<SimulationClock>().pop_next() {
        Some(e) => e,
        None => return false,
    };
    world.insert_resource(CurrentEvent(event));
    schedule.run(world);
    true
}

/// Why a location run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Simulated time passed the window end; admitted orders were completed.
    WindowEnd,
    /// The event queue emptied before the window end.
    Completed,
    /// An external stop signal was raised.
    Stopped,
    /// The real-time budget elapsed.
    WallBudget,
}

/// Knobs that are not part of a location's config.
#[derive(Clone)]
pub struct RunOptions {
    pub wall_clock: Arc<dyn WallClock>,
    pub stop: StopSignal,
    /// Real-time budget of the live phase.
    pub max_wall: Option<Duration>,
    /// Longest sleep between stop-signal checks.
    pub poll_interval: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            wall_clock: Arc::new(SystemWallClock::new()),
            stop: StopSignal::new(),
            max_wall: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl std::fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("stop", &self.stop)
            .field("max_wall", &self.max_wall)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

/// Outcome of one location run.
#[derive(Debug, Clone, Serialize)]
pub struct LocationRun {
    pub location: String,
    pub window_start: chrono::NaiveDate,
    pub total_days: u32,
    pub telemetry: SimTelemetry,
    pub writer: WriterStats,
    pub fields_corrupted: u64,
    pub stop_reason: StopReason,
}

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("geography unavailable: {0}")]
    Geography(#[from] GeographyError),
    #[error(transparent)]
    Writer(#[from] WriterError),
}

/// Turns emitted events into records and feeds the writer.
struct Emitter {
    writer: BatchWriter,
    corruptor: FieldCorruptor,
    gk_id: String,
    location: String,
    fields_corrupted: u64,
    /// Records handed to the writer so far.
    emitted: u64,
    /// Records the writer refused after it stopped.
    unsent: Vec<EventRecord>,
}

impl Emitter {
    /// Returns `Ok(false)` once the writer has stopped accepting records.
    fn emit(&mut self, events: Vec<OrderEvent>) -> Result<bool, SimError> {
        let mut events = events.into_iter();
        while let Some(event) = events.next() {
            let mut record = event
                .into_record(&self.gk_id, &self.location)
                .map_err(WriterError::from)?;
            self.fields_corrupted += self.corruptor.apply(&mut record) as u64;
            if let Err(WriterError::Closed { record }) = self.writer.send(record) {
                self.unsent.extend(record.map(|r| *r));
                for rest in events.by_ref() {
                    if let Ok(record) = rest.into_record(&self.gk_id, &self.location) {
                        self.unsent.push(record);
                    }
                }
                return Ok(false);
            }
            self.emitted += 1;
        }
        Ok(true)
    }

    fn finish(self) -> Result<(WriterStats, u64), WriterError> {
        let fields_corrupted = self.fields_corrupted;
        match self.writer.finish() {
            Ok(stats) if self.unsent.is_empty() => Ok((stats, fields_corrupted)),
            Ok(_) => Err(WriterError::Closed { record: None }),
            Err(WriterError::RetriesExhausted {
                attempts,
                source,
                mut pending,
            }) => {
                pending.extend(self.unsent);
                Err(WriterError::RetriesExhausted {
                    attempts,
                    source,
                    pending,
                })
            }
            Err(err) => Err(err),
        }
    }
}

/// Loads the location's geography and runs it.
pub fn run_location_from_config(
    config: &LocationConfig,
    sink: Box<dyn EventSink>,
    options: &RunOptions,
) -> Result<LocationRun, SimError> {
    let geography = load_geography(config)?;
    run_location(config, geography, sink, options)
}

/// Runs one location to completion: backlog, live phase, writer drain.
pub fn run_location(
    config: &LocationConfig,
    geography: Geography,
    sink: Box<dyn EventSink>,
    options: &RunOptions,
) -> Result<LocationRun, SimError> {
    let window = SimulationWindow::from_params(&config.simulation, Utc::now())?;
    let mut world = World::new();
    build_location(&mut world, config, geography, &window)?;
    let mut schedule = simulation_schedule();

    info!(
        location = %config.location_name,
        first_day = %window.first_day,
        days = window.total_days,
        anchor = %window.anchor,
        speed_up = config.simulation.speed_up,
        "location run started"
    );

    let mut emitter = Emitter {
        writer: BatchWriter::spawn(
            &config.location_name,
            WriterSettings::from(&config.batching),
            sink,
        ),
        corruptor: FieldCorruptor::new(&config.corruption, config.random_seed),
        gk_id: config.gk_id.clone(),
        location: config.location_name.clone(),
        fields_corrupted: 0,
        emitted: 0,
        unsent: Vec::new(),
    };

    let stop_reason = drive(&mut world, &mut schedule, &window, config, options, &mut emitter);
    let telemetry = world
        .get_resource::<SimTelemetry>()
        .cloned()
        .unwrap_or_default();
    let stop_reason = match stop_reason {
        Ok(Some(reason)) => reason,
        // The writer stopped; its error explains why.
        Ok(None) => {
            let err = emitter.finish().err().unwrap_or(WriterError::Closed { record: None });
            return Err(err.into());
        }
        Err(err) => return Err(err),
    };
    let (writer, fields_corrupted) = emitter.finish()?;

    info!(
        location = %config.location_name,
        reason = ?stop_reason,
        orders = telemetry.orders_admitted,
        skipped = telemetry.orders_skipped,
        events = telemetry.events_emitted,
        flushes = writer.flushes,
        "location run finished"
    );

    Ok(LocationRun {
        location: config.location_name.clone(),
        window_start: window.first_day,
        total_days: window.total_days,
        telemetry,
        writer,
        fields_corrupted,
        stop_reason,
    })
}

/// Steps through every event due at or before `until_ms`, handing each
/// step's events to the writer as they are produced. Returns the number of
/// steps, or `None` once the writer stops accepting records.
fn stream_until(
    world: &mut World,
    schedule: &mut Schedule,
    until_ms: u64,
    emitter: &mut Emitter,
) -> Result<Option<usize>, SimError> {
    let mut steps = 0;
    while run_next_event(world, schedule, until_ms) {
        steps += 1;
        let events: Vec<OrderEvent> = match world.get_resource_mut::<Outbox>() {
            Some(mut outbox) => outbox.drain().collect(),
            None => continue,
        };
        if !events.is_empty() && !emitter.emit(events)? {
            return Ok(None);
        }
    }
    Ok(Some(steps))
}

/// Backlog then live loop. `Ok(None)` means the writer stopped early.
fn drive(
    world: &mut World,
    schedule: &mut Schedule,
    window: &SimulationWindow,
    config: &LocationConfig,
    options: &RunOptions,
    emitter: &mut Emitter,
) -> Result<Option<StopReason>, SimError> {
    let emitted_before = emitter.emitted;
    let Some(steps) = stream_until(world, schedule, window.anchor_sim_ms, emitter)? else {
        return Ok(None);
    };
    if emitter.writer.flush().is_err() {
        return Ok(None);
    }
    debug!(
        location = %config.location_name,
        steps,
        events = emitter.emitted - emitted_before,
        "backlog produced"
    );

    let pacing = Pacing::new(window.anchor_sim_ms, config.simulation.speed_up);
    let wall = &options.wall_clock;
    let live_start = wall.elapsed();
    loop {
        if options.stop.is_stopped() {
            discard_schedule(world);
            return Ok(Some(StopReason::Stopped));
        }
        let live_elapsed = wall.elapsed().saturating_sub(live_start);
        let sim_now = pacing.sim_now(live_elapsed);

        if sim_now >= window.end_sim_ms {
            if stream_until(world, schedule, u64::MAX, emitter)?.is_none() {
                return Ok(None);
            }
            return Ok(Some(StopReason::WindowEnd));
        }

        if stream_until(world, schedule, sim_now, emitter)?.is_none() {
            return Ok(None);
        }

        let remaining_budget = match options.max_wall {
            Some(budget) if live_elapsed >= budget => {
                discard_schedule(world);
                return Ok(Some(StopReason::WallBudget));
            }
            Some(budget) => Some(budget - live_elapsed),
            None => None,
        };

        let Some(next) = world.resource::<SimulationClock>().next_event_time() else {
            return Ok(Some(StopReason::Completed));
        };
        let due = next.min(window.end_sim_ms);
        let mut nap = pacing
            .wall_for(due.saturating_sub(sim_now))
            .min(options.poll_interval);
        if let Some(remaining) = remaining_budget {
            nap = nap.min(remaining);
        }
        wall.sleep(nap.max(MIN_SLEEP));
    }
}

fn discard_schedule(world: &mut World) {
    if let Some(mut clock) = world.get_resource_mut::<SimulationClock>() {
        clock.clear();
    }
}
