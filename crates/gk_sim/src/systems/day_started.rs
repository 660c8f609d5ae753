use bevy_ecs::prelude::{Res, ResMut};
use chrono::{Datelike, Days};
use tracing::debug;

use crate::clock::{CurrentEvent, EventKind, EventSubject, SimulationClock, ONE_DAY_MS};
use crate::demand::DemandModel;
use crate::ecs::{LocationContext, SimRng};
use crate::telemetry::SimTelemetry;

/// Admits a day's orders: draws the count and arrival instants, schedules
/// one `OrderArrival` per order and the next day's `DayStarted`.
pub fn day_started_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    ctx: Res<LocationContext>,
    demand: Res<DemandModel>,
    mut rng: ResMut<SimRng>,
    mut telemetry: ResMut<SimTelemetry>,
) {
    if event.0.kind != EventKind::DayStarted {
        return;
    }
    let Some(EventSubject::Day(day)) = event.0.subject else {
        return;
    };
    let Some(date) = ctx.first_day.checked_add_days(Days::new(u64::from(day))) else {
        return;
    };

    let day_start = u64::from(day) * ONE_DAY_MS;
    let rng = &mut rng.0;
    let count = demand.order_count(day, date.weekday(), rng);
    let arrivals = demand.sample_arrivals(day_start, count, rng);
    let mut scheduled = 0u32;
    for ts in arrivals {
        if ts >= ctx.window_end_ms {
            continue;
        }
        clock.schedule_at(ts, EventKind::OrderArrival, Some(EventSubject::Day(day)));
        scheduled += 1;
    }
    telemetry.days_simulated += 1;
    debug!(
        location = %ctx.location,
        day,
        %date,
        weekday = %date.weekday(),
        target = demand.target_volume(day, date.weekday()),
        orders = scheduled,
        "day started"
    );

    if day + 1 < ctx.total_days {
        clock.schedule_at(
            day_start + ONE_DAY_MS,
            EventKind::DayStarted,
            Some(EventSubject::Day(day + 1)),
        );
    }
}
