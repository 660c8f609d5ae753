//! Order lifecycle planning.
//!
//! `created → started → finished → ready → picked_up → [ping]* → delivered`,
//! with `driver_arrived` sampled independently of kitchen progress. An order
//! is fully planned when it is admitted; the ECS then releases the planned
//! events one by one as simulated time reaches them.

use rand::Rng;

use crate::basket::OrderItem;
use crate::distributions::{minutes_to_ms, DriverArrivalModel, StageSample};
use crate::event::{round_to, EventBody, OrderCreatedBody};
use crate::geography::GeoPoint;
use crate::routing::Trip;

mod pings;

pub use pings::{ping_schedule, PingSlot};

const MINUTE_DECIMALS: i32 = 2;
const COORD_DECIMALS: i32 = 6;

/// Everything sampled about an order before its timeline.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub brand_id: u32,
    pub brand: String,
    pub items: Vec<OrderItem>,
    pub trip: Trip,
}

/// Kitchen facts copied into event bodies.
#[derive(Debug, Clone, Copy)]
pub struct KitchenInfo {
    pub point: GeoPoint,
    pub radius_mi: f64,
    pub ping_sec: u64,
}

/// Simulation-time instants of an order's milestones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleTiming {
    pub created: u64,
    pub started: u64,
    pub finished: u64,
    pub ready: u64,
    pub driver_arrived: u64,
    pub picked_up: u64,
    pub delivered: u64,
}

impl LifecycleTiming {
    /// Chains the stage durations from `created` and samples the driver's
    /// arrival against the resulting kitchen timeline.
    pub fn sample<R: Rng + ?Sized>(
        created: u64,
        stages: &StageSample,
        route_minutes: f64,
        arrival: &DriverArrivalModel,
        rng: &mut R,
    ) -> Self {
        let started = created + minutes_to_ms(stages.queue);
        let finished = started + minutes_to_ms(stages.cook);
        let ready = finished + minutes_to_ms(stages.package);
        let picked_up = ready + minutes_to_ms(stages.driver_wait);
        let delivered = picked_up + minutes_to_ms(route_minutes);
        let driver_arrived = arrival.sample_arrival_ms(rng, created, ready, picked_up);
        Self {
            created,
            started,
            finished,
            ready,
            driver_arrived,
            picked_up,
            delivered,
        }
    }

    pub fn prep_minutes(&self) -> f64 {
        (self.ready - self.created) as f64 / 60_000.0
    }

    pub fn total_minutes(&self) -> f64 {
        (self.delivered - self.created) as f64 / 60_000.0
    }
}

/// A lifecycle event at its sampled simulation time.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedEvent {
    pub ts_ms: u64,
    pub body: EventBody,
}

#[derive(Debug, Clone)]
pub struct LifecyclePlan {
    /// Canonical order; index is the event's sequence number.
    pub events: Vec<PlannedEvent>,
    pub timing: LifecycleTiming,
}

fn point_pair(point: GeoPoint) -> [f64; 2] {
    [round_to(point.lat, COORD_DECIMALS), round_to(point.lon, COORD_DECIMALS)]
}

/// Builds the full canonical event list for one order.
pub fn plan_lifecycle(
    draft: &OrderDraft,
    stages: &StageSample,
    timing: LifecycleTiming,
    kitchen: &KitchenInfo,
) -> LifecyclePlan {
    let trip = &draft.trip;
    let [gk_lat, gk_lon] = point_pair(kitchen.point);
    let [customer_lat, customer_lon] = point_pair(trip.customer);
    let pings = ping_schedule(trip.route_minutes, kitchen.ping_sec);

    let mut events = Vec::with_capacity(7 + pings.len());
    events.push(PlannedEvent {
        ts_ms: timing.created,
        body: EventBody::OrderCreated(OrderCreatedBody {
            brand_id: draft.brand_id,
            brand: draft.brand.clone(),
            customer_lat,
            customer_lon,
            customer_addr: trip.customer_addr.clone(),
            items: draft.items.clone(),
            gk_lat,
            gk_lon,
            radius_mi: kitchen.radius_mi,
        }),
    });
    events.push(PlannedEvent {
        ts_ms: timing.started,
        body: EventBody::GkStarted {
            queue_mins: round_to(stages.queue, MINUTE_DECIMALS),
        },
    });
    events.push(PlannedEvent {
        ts_ms: timing.finished,
        body: EventBody::GkFinished {
            cook_mins: round_to(stages.cook, MINUTE_DECIMALS),
        },
    });
    events.push(PlannedEvent {
        ts_ms: timing.ready,
        body: EventBody::GkReady {
            package_mins: round_to(stages.package, MINUTE_DECIMALS),
        },
    });
    events.push(PlannedEvent {
        ts_ms: timing.driver_arrived,
        body: EventBody::DriverArrived { gk_lat, gk_lon },
    });
    events.push(PlannedEvent {
        ts_ms: timing.picked_up,
        body: EventBody::DriverPickedUp {
            route_points: trip.route.points().iter().copied().map(point_pair).collect(),
            route_miles: round_to(trip.route_miles, MINUTE_DECIMALS),
            eta_mins: round_to(trip.route_minutes, MINUTE_DECIMALS),
        },
    });
    for ping in pings {
        let position = trip.route.position_at(ping.fraction).unwrap_or(trip.customer);
        let [loc_lat, loc_lon] = point_pair(position);
        events.push(PlannedEvent {
            ts_ms: (timing.picked_up + ping.offset_ms).min(timing.delivered),
            body: EventBody::DriverPing {
                loc_lat,
                loc_lon,
                progress_pct: ping.fraction * 100.0,
                eta_mins: round_to(ping.eta_mins, MINUTE_DECIMALS),
            },
        });
    }
    events.push(PlannedEvent {
        ts_ms: timing.delivered,
        body: EventBody::Delivered {
            delivered_lat: customer_lat,
            delivered_lon: customer_lon,
        },
    });

    LifecyclePlan { events, timing }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverArrivalParams;
    use crate::event::EventType;
    use crate::routing::Route;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn trip(route_minutes: f64) -> Trip {
        let start = GeoPoint::new(37.7913, -122.3937);
        let end = start.offset_m(1_000.0, 0.0);
        let route = Route::from_points(vec![start, start.offset_m(500.0, 0.0), end]);
        Trip {
            customer_node: 2,
            customer: end,
            customer_addr: "1 Market St".to_string(),
            route_miles: route.length_miles(),
            route,
            route_minutes,
        }
    }

    fn draft(route_minutes: f64) -> OrderDraft {
        OrderDraft {
            brand_id: 3,
            brand: "Taco Fleet".to_string(),
            items: Vec::new(),
            trip: trip(route_minutes),
        }
    }

    fn stages() -> StageSample {
        StageSample {
            queue: 2.0,
            cook: 10.0,
            package: 1.5,
            driver_wait: 4.0,
        }
    }

    fn arrival(after_ready_pct: f64) -> DriverArrivalModel {
        DriverArrivalModel::from_config(&DriverArrivalParams {
            alpha: 2.0,
            beta: 2.0,
            after_ready_pct,
        })
        .expect("model")
    }

    fn kitchen() -> KitchenInfo {
        KitchenInfo {
            point: GeoPoint::new(37.7913, -122.3937),
            radius_mi: 4.0,
            ping_sec: 60,
        }
    }

    #[test]
    fn timing_chains_stage_durations() {
        let mut rng = StdRng::seed_from_u64(1);
        let t = LifecycleTiming::sample(1_000, &stages(), 12.0, &arrival(0.5), &mut rng);
        assert_eq!(t.started, 1_000 + 120_000);
        assert_eq!(t.finished, t.started + 600_000);
        assert_eq!(t.ready, t.finished + 90_000);
        assert_eq!(t.picked_up, t.ready + 240_000);
        assert_eq!(t.delivered, t.picked_up + 720_000);
        assert!(t.driver_arrived >= t.created && t.driver_arrived <= t.picked_up);
        assert!((t.prep_minutes() - 13.5).abs() < 1e-9);
    }

    #[test]
    fn plan_is_in_canonical_order_with_pings() {
        let mut rng = StdRng::seed_from_u64(2);
        let timing = LifecycleTiming::sample(0, &stages(), 12.0, &arrival(1.0), &mut rng);
        let plan = plan_lifecycle(&draft(12.0), &stages(), timing, &kitchen());
        let types: Vec<_> = plan.events.iter().map(|e| e.body.event_type()).collect();
        assert_eq!(types.len(), 7 + 12);
        assert_eq!(&types[..6], &EventType::ALL[..6]);
        assert!(types[6..18].iter().all(|t| *t == EventType::DriverPing));
        assert_eq!(types[18], EventType::Delivered);

        let mut last_pct = 0.0;
        for event in &plan.events[6..18] {
            let EventBody::DriverPing { progress_pct, .. } = event.body else {
                panic!("expected ping");
            };
            assert!(progress_pct > last_pct && progress_pct <= 100.0);
            last_pct = progress_pct;
            assert!(event.ts_ms > timing.picked_up && event.ts_ms <= timing.delivered);
        }
    }

    #[test]
    fn kitchen_chain_is_non_decreasing() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            let timing = LifecycleTiming::sample(0, &stages(), 7.3, &arrival(0.3), &mut rng);
            let plan = plan_lifecycle(&draft(7.3), &stages(), timing, &kitchen());
            let ts: Vec<u64> = plan.events.iter().map(|e| e.ts_ms).collect();
            assert!(ts[1] >= ts[0] && ts[2] >= ts[1] && ts[3] >= ts[2]);
            assert!(ts[5] >= ts[3]);
            assert!(ts[4] >= ts[0]);
            assert!(ts[6..].windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn delivered_at_customer() {
        let mut rng = StdRng::seed_from_u64(4);
        let timing = LifecycleTiming::sample(0, &stages(), 3.0, &arrival(0.5), &mut rng);
        let d = draft(3.0);
        let plan = plan_lifecycle(&d, &stages(), timing, &kitchen());
        let Some(PlannedEvent {
            body: EventBody::Delivered { delivered_lat, .. },
            ..
        }) = plan.events.last()
        else {
            panic!("last event must be delivered");
        };
        assert!((delivered_lat - d.trip.customer.lat).abs() < 1e-6);
    }
}
