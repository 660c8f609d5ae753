//! Service-time and driver-arrival distributions.
//!
//! Kitchen stages and the driver wait are independent Gaussians (minutes),
//! clamped so no stage ever takes zero or negative time. Driver arrival is
//! a Beta sample mapped onto a window of the kitchen timeline.

use bevy_ecs::prelude::Resource;
use rand::Rng;
use rand_distr::{Beta, Distribution, Normal};

use crate::config::{ConfigError, DriverArrivalParams, MeanStd, ServiceTimes};
use crate::clock::ONE_MIN_MS;

/// Floor applied to every sampled stage duration.
pub const MIN_STAGE_MINUTES: f64 = 0.1;

/// Clamped Gaussian stage duration.
#[derive(Debug, Clone)]
pub struct StageDuration {
    normal: Normal<f64>,
}

impl StageDuration {
    pub fn new(name: &'static str, params: MeanStd) -> Result<Self, ConfigError> {
        let normal = Normal::new(params.mean, params.std_dev).map_err(|err| {
            ConfigError::Distribution {
                name,
                reason: err.to_string(),
            }
        })?;
        Ok(Self { normal })
    }

    pub fn sample_minutes<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.normal.sample(rng).max(MIN_STAGE_MINUTES)
    }
}

/// One sample of every stage duration, in minutes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageSample {
    pub queue: f64,
    pub cook: f64,
    pub package: f64,
    pub driver_wait: f64,
}

#[derive(Debug, Clone, Resource)]
pub struct ServiceTimeModel {
    queue: StageDuration,
    cook: StageDuration,
    package: StageDuration,
    driver_wait: StageDuration,
}

impl ServiceTimeModel {
    pub fn from_config(times: &ServiceTimes) -> Result<Self, ConfigError> {
        Ok(Self {
            queue: StageDuration::new("queue", times.queue)?,
            cook: StageDuration::new("cook", times.cook)?,
            package: StageDuration::new("package", times.package)?,
            driver_wait: StageDuration::new("driver_wait", times.driver_wait)?,
        })
    }

    /// Draws the four stages in lifecycle order.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> StageSample {
        StageSample {
            queue: self.queue.sample_minutes(rng),
            cook: self.cook.sample_minutes(rng),
            package: self.package.sample_minutes(rng),
            driver_wait: self.driver_wait.sample_minutes(rng),
        }
    }
}

/// Converts fractional minutes to whole simulation milliseconds.
pub fn minutes_to_ms(minutes: f64) -> u64 {
    (minutes * ONE_MIN_MS as f64).round().max(0.0) as u64
}

#[derive(Debug, Clone, Resource)]
pub struct DriverArrivalModel {
    beta: Beta<f64>,
    after_ready_pct: f64,
}

impl DriverArrivalModel {
    pub fn from_config(params: &DriverArrivalParams) -> Result<Self, ConfigError> {
        let beta = Beta::new(params.alpha, params.beta).map_err(|err| ConfigError::Distribution {
            name: "driver_arrival",
            reason: err.to_string(),
        })?;
        Ok(Self {
            beta,
            after_ready_pct: params.after_ready_pct.clamp(0.0, 1.0),
        })
    }

    /// Samples the arrival instant. With probability `after_ready_pct` the
    /// driver shows up between ready and pickup, otherwise while the food is
    /// still being prepared. Never earlier than `created_ms`.
    pub fn sample_arrival_ms<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        created_ms: u64,
        ready_ms: u64,
        picked_up_ms: u64,
    ) -> u64 {
        let after_ready = rng.gen_bool(self.after_ready_pct);
        let x = self.beta.sample(rng);
        let (start, end) = if after_ready {
            (ready_ms, picked_up_ms)
        } else {
            (created_ms, ready_ms)
        };
        let span = end.saturating_sub(start) as f64;
        let arrival = start as f64 + x * span;
        (arrival.round() as u64).max(created_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn mean_std(mean: f64, std_dev: f64) -> MeanStd {
        MeanStd { mean, std_dev }
    }

    #[test]
    fn stage_duration_never_drops_below_floor() {
        let stage = StageDuration::new("queue", mean_std(-5.0, 1.0)).expect("valid");
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            assert!(stage.sample_minutes(&mut rng) >= MIN_STAGE_MINUTES);
        }
    }

    #[test]
    fn zero_std_dev_is_deterministic() {
        let stage = StageDuration::new("cook", mean_std(12.0, 0.0)).expect("valid");
        let mut rng = StdRng::seed_from_u64(9);
        assert_eq!(stage.sample_minutes(&mut rng), 12.0);
    }

    #[test]
    fn minutes_convert_to_ms() {
        assert_eq!(minutes_to_ms(1.5), 90_000);
        assert_eq!(minutes_to_ms(0.1), 6_000);
    }

    #[test]
    fn arrival_respects_window_choice() {
        let params = DriverArrivalParams {
            alpha: 2.0,
            beta: 5.0,
            after_ready_pct: 1.0,
        };
        let model = DriverArrivalModel::from_config(&params).expect("valid");
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            let t = model.sample_arrival_ms(&mut rng, 0, 1_000, 2_000);
            assert!((1_000..=2_000).contains(&t));
        }

        let early = DriverArrivalModel::from_config(&DriverArrivalParams {
            after_ready_pct: 0.0,
            ..params
        })
        .expect("valid");
        for _ in 0..100 {
            let t = early.sample_arrival_ms(&mut rng, 500, 1_000, 2_000);
            assert!((500..=1_000).contains(&t));
        }
    }

    #[test]
    fn invalid_beta_is_a_config_error() {
        let params = DriverArrivalParams {
            alpha: 0.0,
            beta: 1.0,
            after_ready_pct: 0.5,
        };
        assert!(DriverArrivalModel::from_config(&params).is_err());
    }
}
