//! Builds one location's simulation world from its config.

use bevy_ecs::prelude::World;
use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::basket::BasketSampler;
use crate::clock::{EventKind, EventSubject, SimulationClock, ONE_DAY_MS};
use crate::config::{ConfigError, LocationConfig, SimulationParams};
use crate::demand::DemandModel;
use crate::distributions::{DriverArrivalModel, ServiceTimeModel};
use crate::ecs::{LocationContext, Outbox, SimRng};
use crate::geography::{GeoPoint, Geography};
use crate::lifecycle::KitchenInfo;
use crate::momentum::BrandMomentum;
use crate::routing::TripPlanner;
use crate::telemetry::SimTelemetry;

/// Calendar window of a run.
///
/// Days `[date(anchor) - start_days_ago, date(anchor) + end_days_ahead)` are
/// simulated. Simulation time zero is midnight UTC of the first day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationWindow {
    pub anchor: DateTime<Utc>,
    pub first_day: NaiveDate,
    pub total_days: u32,
    /// Unix milliseconds of simulation time zero.
    pub epoch_ms: i64,
    /// Simulation instant of the anchor; everything up to it is backlog.
    pub anchor_sim_ms: u64,
    /// First simulation instant after the window.
    pub end_sim_ms: u64,
}

impl SimulationWindow {
    /// `now` is used when the config does not pin an anchor.
    pub fn from_params(params: &SimulationParams, now: DateTime<Utc>) -> Result<Self, ConfigError> {
        let anchor = params.anchor.unwrap_or(now);
        let anchor_day = anchor.date_naive();
        let first_day = anchor_day
            .checked_sub_days(Days::new(u64::from(params.start_days_ago)))
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "start_days_ago {} reaches before the calendar",
                    params.start_days_ago
                ))
            })?;
        let total_days = params
            .start_days_ago
            .checked_add(params.end_days_ahead)
            .ok_or_else(|| ConfigError::Invalid("simulation window too long".to_string()))?;
        let epoch = Utc.from_utc_datetime(&first_day.and_time(NaiveTime::MIN));
        let epoch_ms = epoch.timestamp_millis();
        let anchor_sim_ms = u64::try_from(anchor.timestamp_millis() - epoch_ms).unwrap_or(0);
        Ok(Self {
            anchor,
            first_day,
            total_days,
            epoch_ms,
            anchor_sim_ms,
            end_sim_ms: u64::from(total_days) * ONE_DAY_MS,
        })
    }

    /// Last simulated calendar day, if any.
    pub fn last_day(&self) -> Option<NaiveDate> {
        self.total_days
            .checked_sub(1)
            .and_then(|d| self.first_day.checked_add_days(Days::new(u64::from(d))))
    }
}

/// Inserts every resource a location needs and schedules the first
/// `DayStarted`. The location RNG is seeded from `random_seed`; brand
/// classes are its first draws.
pub fn build_location(
    world: &mut World,
    config: &LocationConfig,
    geography: Geography,
    window: &SimulationWindow,
) -> Result<(), ConfigError> {
    let mut rng = StdRng::seed_from_u64(config.random_seed);
    let momentum = BrandMomentum::assign(&config.brands, &config.momentum, &mut rng);

    let mut clock = SimulationClock::with_epoch(window.epoch_ms);
    if window.total_days > 0 {
        clock.schedule_at(0, EventKind::DayStarted, Some(EventSubject::Day(0)));
    }

    world.insert_resource(LocationContext {
        location: config.location_name.clone(),
        gk_id: config.gk_id.clone(),
        kitchen: KitchenInfo {
            point: GeoPoint::new(config.kitchen.lat, config.kitchen.lon),
            radius_mi: config.radius_mi,
            ping_sec: config.ping_sec,
        },
        window_end_ms: window.end_sim_ms,
        total_days: window.total_days,
        first_day: window.first_day,
    });
    world.insert_resource(DemandModel::new(&config.demand, window.total_days));
    world.insert_resource(ServiceTimeModel::from_config(&config.service_times)?);
    world.insert_resource(DriverArrivalModel::from_config(&config.driver_arrival)?);
    world.insert_resource(BasketSampler::new(&config.brands, &config.basket));
    world.insert_resource(momentum);
    world.insert_resource(TripPlanner::with_default_provider(
        geography,
        config.driver_mph,
    ));
    world.insert_resource(SimRng(rng));
    world.insert_resource(Outbox::default());
    world.insert_resource(SimTelemetry::default());
    world.insert_resource(clock);
    Ok(())
}
