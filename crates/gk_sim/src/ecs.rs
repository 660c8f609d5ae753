use bevy_ecs::prelude::{Component, Resource};
use chrono::NaiveDate;
use rand::rngs::StdRng;
use uuid::Uuid;

use crate::event::{EventType, OrderEvent};
use crate::lifecycle::{KitchenInfo, LifecyclePlan, PlannedEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OrderStage {
    Created,
    Started,
    Finished,
    Ready,
    DriverArrived,
    PickedUp,
    EnRoute,
    Delivered,
}

impl OrderStage {
    pub fn after(event_type: EventType) -> Self {
        match event_type {
            EventType::OrderCreated => OrderStage::Created,
            EventType::GkStarted => OrderStage::Started,
            EventType::GkFinished => OrderStage::Finished,
            EventType::GkReady => OrderStage::Ready,
            EventType::DriverArrived => OrderStage::DriverArrived,
            EventType::DriverPickedUp => OrderStage::PickedUp,
            EventType::DriverPing => OrderStage::EnRoute,
            EventType::Delivered => OrderStage::Delivered,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Component)]
pub struct Order {
    pub order_id: Uuid,
    pub brand_id: u32,
    pub created_at_ms: u64,
    pub stage: OrderStage,
}

impl Order {
    /// Moves the order forward. Stages never go backwards; returns whether
    /// the stage changed.
    pub fn advance(&mut self, event_type: EventType) -> bool {
        let next = OrderStage::after(event_type);
        if next > self.stage {
            self.stage = next;
            true
        } else {
            false
        }
    }
}

/// Planned events of an order and the emission cursor.
#[derive(Debug, Clone, Component)]
pub struct Lifecycle {
    pub plan: LifecyclePlan,
    /// Sequence number of the next event to emit.
    pub next: usize,
}

impl Lifecycle {
    pub fn new(plan: LifecyclePlan) -> Self {
        Self { plan, next: 0 }
    }

    pub fn peek(&self) -> Option<&PlannedEvent> {
        self.plan.events.get(self.next)
    }
}

/// Per-location facts the systems need.
#[derive(Debug, Clone, Resource)]
pub struct LocationContext {
    pub location: String,
    pub gk_id: String,
    pub kitchen: KitchenInfo,
    /// No orders are admitted at or after this simulation instant.
    pub window_end_ms: u64,
    pub total_days: u32,
    pub first_day: NaiveDate,
}

/// The location's single RNG stream; all order sampling draws from it.
#[derive(Debug, Resource)]
pub struct SimRng(pub StdRng);

/// Events emitted during the current step, drained by the runner.
#[derive(Debug, Default, Resource)]
pub struct Outbox(pub Vec<OrderEvent>);

impl Outbox {
    pub fn drain(&mut self) -> std::vec::Drain<'_, OrderEvent> {
        self.0.drain(..)
    }
}
