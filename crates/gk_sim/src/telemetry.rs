//! Run telemetry: counters and per-order durations for the run summary.

use std::collections::BTreeMap;

use bevy_ecs::prelude::Resource;
use serde::Serialize;

use crate::event::EventType;
use crate::lifecycle::LifecycleTiming;

/// Durations of one delivered order, in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DeliveredOrderRecord {
    pub prep_minutes: f64,
    pub delivery_minutes: f64,
    pub total_minutes: f64,
}

impl DeliveredOrderRecord {
    pub fn from_timing(timing: &LifecycleTiming) -> Self {
        let minutes = |from: u64, to: u64| to.saturating_sub(from) as f64 / 60_000.0;
        Self {
            prep_minutes: minutes(timing.created, timing.ready),
            delivery_minutes: minutes(timing.ready, timing.delivered),
            total_minutes: minutes(timing.created, timing.delivered),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Resource)]
pub struct SimTelemetry {
    pub days_simulated: u32,
    pub orders_admitted: u64,
    pub orders_skipped: u64,
    pub orders_delivered: u64,
    pub events_emitted: u64,
    pub events_by_type: BTreeMap<EventType, u64>,
    pub delivered_orders: Vec<DeliveredOrderRecord>,
}

impl SimTelemetry {
    pub fn record_event(&mut self, event_type: EventType) {
        self.events_emitted += 1;
        *self.events_by_type.entry(event_type).or_default() += 1;
    }

    pub fn record_delivered(&mut self, timing: &LifecycleTiming) {
        self.orders_delivered += 1;
        self.delivered_orders
            .push(DeliveredOrderRecord::from_timing(timing));
    }

    pub fn count(&self, event_type: EventType) -> u64 {
        self.events_by_type.get(&event_type).copied().unwrap_or(0)
    }

    /// Admitted orders whose `delivered` event has not been emitted.
    pub fn orders_in_flight(&self) -> u64 {
        self.orders_admitted.saturating_sub(self.orders_delivered)
    }
}
