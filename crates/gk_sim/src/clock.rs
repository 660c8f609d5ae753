//! Discrete-event clock for one location.
//!
//! Simulation time is milliseconds since the clock epoch (midnight UTC of
//! the first simulated day). Events pop in timestamp order; ties pop in the
//! order they were scheduled so a fixed seed replays identically.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use bevy_ecs::prelude::{Entity, Resource};

mod wall;

pub use wall::{Pacing, StopSignal, SteppedWallClock, SystemWallClock, WallClock};

pub const ONE_SEC_MS: u64 = 1_000;
pub const ONE_MIN_MS: u64 = 60 * ONE_SEC_MS;
pub const ONE_HOUR_MS: u64 = 60 * ONE_MIN_MS;
pub const ONE_DAY_MS: u64 = 24 * ONE_HOUR_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// Midnight of a simulated day: the demand model admits that day's orders.
    DayStarted,
    /// A new order is placed.
    OrderArrival,
    /// The next lifecycle event of an order is due for emission.
    EmitStage,
}

/// What a scheduled event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSubject {
    /// Zero-based index of the simulated day.
    Day(u32),
    Order(Entity),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub timestamp: u64,
    pub kind: EventKind,
    pub subject: Option<EventSubject>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Scheduled {
    event: Event,
    seq: u64,
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering to make BinaryHeap a min-heap by (timestamp, seq).
        other
            .event
            .timestamp
            .cmp(&self.event.timestamp)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The event currently being processed by the schedule.
#[derive(Debug, Clone, Copy, Resource)]
pub struct CurrentEvent(pub Event);

#[derive(Debug, Default, Resource)]
pub struct SimulationClock {
    now: u64,
    epoch_ms: i64,
    next_seq: u64,
    events: BinaryHeap<Scheduled>,
}

impl SimulationClock {
    /// Clock whose time zero corresponds to `epoch_ms` Unix milliseconds.
    pub fn with_epoch(epoch_ms: i64) -> Self {
        Self {
            epoch_ms,
            ..Self::default()
        }
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn epoch_ms(&self) -> i64 {
        self.epoch_ms
    }

    pub fn schedule_at(&mut self, timestamp: u64, kind: EventKind, subject: Option<EventSubject>) {
        debug_assert!(
            timestamp >= self.now,
            "event timestamp must be >= current time"
        );
        let seq = self.next_seq;
        self.next_seq += 1;
        self.events.push(Scheduled {
            event: Event {
                timestamp,
                kind,
                subject,
            },
            seq,
        });
    }

    pub fn schedule_in(&mut self, delay_ms: u64, kind: EventKind, subject: Option<EventSubject>) {
        self.schedule_at(self.now.saturating_add(delay_ms), kind, subject);
    }

    pub fn pop_next(&mut self) -> Option<Event> {
        let scheduled = self.events.pop()?;
        self.now = scheduled.event.timestamp;
        Some(scheduled.event)
    }

    pub fn next_event_time(&self) -> Option<u64> {
        self.events.peek().map(|s| s.event.timestamp)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.events.len()
    }

    /// Drop every scheduled event. Used when a run is cancelled.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn sim_to_real_ms(&self, sim_ms: u64) -> i64 {
        self.epoch_ms.saturating_add(sim_ms as i64)
    }

    pub fn real_to_sim_ms(&self, real_ms: i64) -> Option<u64> {
        real_ms
            .checked_sub(self.epoch_ms)
            .and_then(|delta| u64::try_from(delta).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_pops_events_in_time_order() {
        let mut clock = SimulationClock::default();
        clock.schedule_at(10, EventKind::OrderArrival, None);
        clock.schedule_at(5, EventKind::OrderArrival, None);
        clock.schedule_at(20, EventKind::DayStarted, None);

        let first = clock.pop_next().expect("first event");
        assert_eq!(first.timestamp, 5);
        assert_eq!(clock.now(), 5);

        let second = clock.pop_next().expect("second event");
        assert_eq!(second.timestamp, 10);

        let third = clock.pop_next().expect("third event");
        assert_eq!(third.timestamp, 20);
        assert_eq!(third.kind, EventKind::DayStarted);

        assert!(clock.pop_next().is_none());
        assert!(clock.is_empty());
    }

    #[test]
    fn ties_pop_in_scheduling_order() {
        let mut clock = SimulationClock::default();
        clock.schedule_at(7, EventKind::EmitStage, Some(EventSubject::Day(2)));
        clock.schedule_at(7, EventKind::DayStarted, Some(EventSubject::Day(0)));
        clock.schedule_at(7, EventKind::OrderArrival, Some(EventSubject::Day(1)));

        let subjects: Vec<_> = std::iter::from_fn(|| clock.pop_next())
            .map(|e| e.subject)
            .collect();
        assert_eq!(
            subjects,
            vec![
                Some(EventSubject::Day(2)),
                Some(EventSubject::Day(0)),
                Some(EventSubject::Day(1)),
            ]
        );
    }

    #[test]
    fn epoch_conversion_round_trips() {
        let mut clock = SimulationClock::with_epoch(1_700_000_000_000);
        clock.schedule_in(ONE_SEC_MS, EventKind::OrderArrival, None);
        let event = clock.pop_next().expect("event");
        assert_eq!(event.timestamp, ONE_SEC_MS);
        assert_eq!(clock.sim_to_real_ms(1_000), 1_700_000_001_000);
        assert_eq!(clock.real_to_sim_ms(1_700_000_001_000), Some(1_000));
        assert_eq!(clock.real_to_sim_ms(1_699_999_999_000), None);
    }
}
