use bevy_ecs::prelude::{Commands, Res, ResMut};
use tracing::warn;

use crate::basket::BasketSampler;
use crate::clock::{CurrentEvent, EventKind, EventSubject, SimulationClock};
use crate::distributions::{DriverArrivalModel, ServiceTimeModel};
use crate::ecs::{Lifecycle, LocationContext, Order, OrderStage, SimRng};
use crate::event::uuid_from_rng;
use crate::lifecycle::{plan_lifecycle, LifecycleTiming, OrderDraft};
use crate::momentum::BrandMomentum;
use crate::routing::TripPlanner;
use crate::telemetry::SimTelemetry;

/// Places one order: brand, basket and customer are drawn, the whole
/// lifecycle is planned, and emission starts at the creation instant.
/// Orders whose customer cannot be routed to are skipped.
#[allow(clippy::too_many_arguments)]
pub fn order_arrival_system(
    event: Res<CurrentEvent>,
    mut commands: Commands,
    mut clock: ResMut<SimulationClock>,
    ctx: Res<LocationContext>,
    mut rng: ResMut<SimRng>,
    momentum: Res<BrandMomentum>,
    basket: Res<BasketSampler>,
    planner: Res<TripPlanner>,
    service_times: Res<ServiceTimeModel>,
    driver_arrival: Res<DriverArrivalModel>,
    mut telemetry: ResMut<SimTelemetry>,
) {
    if event.0.kind != EventKind::OrderArrival {
        return;
    }
    let Some(EventSubject::Day(day)) = event.0.subject else {
        return;
    };
    let now = clock.now();
    let rng = &mut rng.0;

    let Some((brand_idx, (brand_id, brand))) = momentum
        .sample_brand(day, rng)
        .and_then(|idx| basket.brand(idx).map(|b| (idx, b)))
    else {
        warn!(location = %ctx.location, day, "no brand carries weight; order skipped");
        telemetry.orders_skipped += 1;
        return;
    };
    let items = basket.sample_items(brand_idx, rng);
    let trip = match planner.plan_trip(rng) {
        Ok(trip) => trip,
        Err(err) => {
            warn!(location = %ctx.location, day, error = %err, "order skipped");
            telemetry.orders_skipped += 1;
            return;
        }
    };

    let stages = service_times.sample(rng);
    let timing = LifecycleTiming::sample(now, &stages, trip.route_minutes, &driver_arrival, rng);
    let order_id = uuid_from_rng(rng);
    let draft = OrderDraft {
        brand_id,
        brand: brand.to_string(),
        items,
        trip,
    };
    let plan = plan_lifecycle(&draft, &stages, timing, &ctx.kitchen);

    let entity = commands
        .spawn((
            Order {
                order_id,
                brand_id,
                created_at_ms: now,
                stage: OrderStage::Created,
            },
            Lifecycle::new(plan),
        ))
        .id();
    clock.schedule_at(now, EventKind::EmitStage, Some(EventSubject::Order(entity)));
    telemetry.orders_admitted += 1;
}
