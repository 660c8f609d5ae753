use bevy_ecs::prelude::{Commands, Query, Res, ResMut};

use crate::clock::{CurrentEvent, EventKind, EventSubject, SimulationClock};
use crate::ecs::{Lifecycle, Order, Outbox, SimRng};
use crate::event::{uuid_from_rng, OrderEvent};
use crate::telemetry::SimTelemetry;

/// Emits the order's next planned event and schedules the one after it.
///
/// An event is released no earlier than its predecessor, so emission
/// follows sequence order even when a sampled timestamp (the driver
/// arrival) precedes the previous event's. The record keeps the sampled
/// timestamp.
pub fn emit_stage_system(
    event: Res<CurrentEvent>,
    mut commands: Commands,
    mut clock: ResMut<SimulationClock>,
    mut rng: ResMut<SimRng>,
    mut outbox: ResMut<Outbox>,
    mut telemetry: ResMut<SimTelemetry>,
    mut orders: Query<(&mut Order, &mut Lifecycle)>,
) {
    if event.0.kind != EventKind::EmitStage {
        return;
    }
    let Some(EventSubject::Order(entity)) = event.0.subject else {
        return;
    };
    let Ok((mut order, mut lifecycle)) = orders.get_mut(entity) else {
        return;
    };
    let now = clock.now();

    let sequence = lifecycle.next as u32;
    let Some(planned) = lifecycle.peek().cloned() else {
        commands.entity(entity).despawn();
        return;
    };
    let event_type = planned.body.event_type();
    order.advance(event_type);
    lifecycle.next += 1;

    outbox.0.push(OrderEvent {
        event_id: uuid_from_rng(&mut rng.0),
        order_id: order.order_id,
        sequence,
        ts_ms: clock.sim_to_real_ms(planned.ts_ms),
        body: planned.body,
    });
    telemetry.record_event(event_type);

    match lifecycle.peek() {
        Some(next) => {
            let release = next.ts_ms.max(now);
            clock.schedule_at(release, EventKind::EmitStage, Some(EventSubject::Order(entity)));
        }
        None => {
            telemetry.record_delivered(&lifecycle.plan.timing);
            commands.entity(entity).despawn();
        }
    }
}
