//! Daily order volume and arrival times.

use bevy_ecs::prelude::Resource;
use chrono::Weekday;
use rand::Rng;

use crate::config::DemandParams;
use crate::patterns::{weekday_multiplier, IntradayProfile};

#[derive(Debug, Clone, Resource)]
pub struct DemandModel {
    orders_day_1: f64,
    orders_last: f64,
    noise_pct: f64,
    total_days: u32,
    profile: IntradayProfile,
}

impl DemandModel {
    pub fn new(params: &DemandParams, total_days: u32) -> Self {
        Self {
            orders_day_1: params.orders_day_1,
            orders_last: params.orders_last,
            noise_pct: params.noise_pct,
            total_days,
            profile: IntradayProfile::default(),
        }
    }

    pub fn profile(&self) -> &IntradayProfile {
        &self.profile
    }

    /// Growth-curve volume for day `day`, before weekday and noise.
    pub fn base_volume(&self, day: u32) -> f64 {
        let t = if self.total_days == 0 {
            0.0
        } else {
            day as f64 / self.total_days as f64
        };
        self.orders_day_1 + (self.orders_last - self.orders_day_1) * t
    }

    /// Noise-free target for a day.
    pub fn target_volume(&self, day: u32, weekday: Weekday) -> f64 {
        self.base_volume(day) * weekday_multiplier(weekday)
    }

    /// Number of orders to admit on `day`. The RNG is only consulted when
    /// noise is enabled.
    pub fn order_count<R: Rng + ?Sized>(&self, day: u32, weekday: Weekday, rng: &mut R) -> u32 {
        let mut target = self.target_volume(day, weekday);
        if self.noise_pct > 0.0 {
            target *= rng.gen_range((1.0 - self.noise_pct)..=(1.0 + self.noise_pct));
        }
        if !(target > 0.0) {
            return 0;
        }
        target.round().min(u32::MAX as f64) as u32
    }

    /// `count` arrival instants within the day starting at `day_start_ms`,
    /// sorted ascending.
    pub fn sample_arrivals<R: Rng + ?Sized>(
        &self,
        day_start_ms: u64,
        count: u32,
        rng: &mut R,
    ) -> Vec<u64> {
        let mut arrivals: Vec<u64> = (0..count)
            .map(|_| day_start_ms + self.profile.sample_offset_ms(rng))
            .collect();
        arrivals.sort_unstable();
        arrivals
    }
}
