use std::collections::HashSet;

use super::{ConfigError, LocationConfig, MeanStd, MomentumParams};

/// Absolute tolerance when checking that momentum fractions sum to one.
pub const MOMENTUM_SUM_TOLERANCE: f64 = 1e-9;

impl MomentumParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("improving", self.improving),
            ("flat", self.flat),
            ("declining", self.declining),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "momentum fraction `{name}` must be within [0, 1], got {value}"
                )));
            }
        }
        let sum = self.improving + self.flat + self.declining;
        if (sum - 1.0).abs() > MOMENTUM_SUM_TOLERANCE {
            return Err(ConfigError::MomentumFractions { sum });
        }
        if !(0.0..1.0).contains(&self.declining_rate) || self.improving_rate < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "momentum rates out of range (improving {}, declining {})",
                self.improving_rate, self.declining_rate
            )));
        }
        Ok(())
    }
}

fn check_mean_std(name: &'static str, value: &MeanStd) -> Result<(), ConfigError> {
    if !value.mean.is_finite() || !value.std_dev.is_finite() {
        return Err(ConfigError::Distribution {
            name,
            reason: "mean and std_dev must be finite".to_string(),
        });
    }
    if value.std_dev < 0.0 {
        return Err(ConfigError::Distribution {
            name,
            reason: format!("std_dev must be >= 0, got {}", value.std_dev),
        });
    }
    Ok(())
}

impl LocationConfig {
    /// Check every cross-field constraint. Called by the loaders.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.location_name.trim().is_empty() {
            return Err(ConfigError::Invalid("location_name is empty".to_string()));
        }
        if !(-90.0..=90.0).contains(&self.kitchen.lat) || !(-180.0..=180.0).contains(&self.kitchen.lon)
        {
            return Err(ConfigError::Invalid(format!(
                "kitchen geocode ({}, {}) is not a valid coordinate",
                self.kitchen.lat, self.kitchen.lon
            )));
        }
        if !(self.radius_mi > 0.0) {
            return Err(ConfigError::Invalid("radius_mi must be > 0".to_string()));
        }
        if !(self.simulation.speed_up > 0.0) || !self.simulation.speed_up.is_finite() {
            return Err(ConfigError::Invalid("simulation.speed_up must be > 0".to_string()));
        }
        if self.demand.orders_day_1 < 0.0 || self.demand.orders_last < 0.0 {
            return Err(ConfigError::Invalid("order volumes must be >= 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.demand.noise_pct) {
            return Err(ConfigError::Invalid("demand.noise_pct must be within [0, 1]".to_string()));
        }

        check_mean_std("queue", &self.service_times.queue)?;
        check_mean_std("cook", &self.service_times.cook)?;
        check_mean_std("package", &self.service_times.package)?;
        check_mean_std("driver_wait", &self.service_times.driver_wait)?;

        let arrival = &self.driver_arrival;
        if !(arrival.alpha > 0.0) || !(arrival.beta > 0.0) {
            return Err(ConfigError::Distribution {
                name: "driver_arrival",
                reason: format!(
                    "alpha and beta must be > 0 (got {}, {})",
                    arrival.alpha, arrival.beta
                ),
            });
        }
        if !(0.0..=1.0).contains(&arrival.after_ready_pct) {
            return Err(ConfigError::Distribution {
                name: "driver_arrival",
                reason: "after_ready_pct must be within [0, 1]".to_string(),
            });
        }
        if !(self.driver_mph > 0.0) {
            return Err(ConfigError::Invalid("driver_mph must be > 0".to_string()));
        }

        self.momentum.validate()?;

        if self.batching.batch_rows == 0 {
            return Err(ConfigError::Invalid("batching.batch_rows must be > 0".to_string()));
        }
        if !(self.batching.batch_seconds > 0.0) || !self.batching.batch_seconds.is_finite() {
            return Err(ConfigError::Invalid(
                "batching.batch_seconds must be > 0".to_string(),
            ));
        }
        if self.ping_sec == 0 {
            return Err(ConfigError::Invalid("ping_sec must be > 0".to_string()));
        }

        for rule in &self.corruption {
            rule.validate()?;
        }

        self.validate_catalog()?;

        let basket = &self.basket;
        if basket.min_items == 0 || basket.min_items > basket.max_items || basket.max_qty == 0 {
            return Err(ConfigError::Invalid(format!(
                "basket shape invalid (min_items {}, max_items {}, max_qty {})",
                basket.min_items, basket.max_items, basket.max_qty
            )));
        }
        if !(self.address_weight > 0.0) {
            return Err(ConfigError::Invalid("address_weight must be > 0".to_string()));
        }
        Ok(())
    }

    fn validate_catalog(&self) -> Result<(), ConfigError> {
        if self.brands.is_empty() {
            return Err(ConfigError::Invalid("at least one brand is required".to_string()));
        }
        let mut brand_ids = HashSet::new();
        for brand in &self.brands {
            if !brand_ids.insert(brand.id) {
                return Err(ConfigError::Invalid(format!("duplicate brand id {}", brand.id)));
            }
            if brand.items.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "brand {} has an empty menu",
                    brand.name
                )));
            }
            if !(brand.base_weight >= 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "brand {} has a negative base_weight",
                    brand.name
                )));
            }
            for item in &brand.items {
                if !(item.price >= 0.0) {
                    return Err(ConfigError::Invalid(format!(
                        "item {} has a negative price",
                        item.id
                    )));
                }
                if item.popularity.is_some_and(|p| !(p >= 0.0)) {
                    return Err(ConfigError::Invalid(format!(
                        "item {} has a negative popularity",
                        item.id
                    )));
                }
            }
        }
        if self.brands.iter().all(|b| b.base_weight == 0.0) {
            return Err(ConfigError::Invalid(
                "all brands have zero base_weight".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::test_config;

    fn momentum(improving: f64, flat: f64, declining: f64) -> MomentumParams {
        MomentumParams {
            improving,
            flat,
            declining,
            improving_rate: 0.05,
            declining_rate: 0.05,
        }
    }

    #[test]
    fn momentum_summing_to_one_is_accepted() {
        assert!(momentum(0.2, 0.5, 0.3).validate().is_ok());
        assert!(momentum(0.0, 1.0, 0.0).validate().is_ok());
    }

    #[test]
    fn momentum_off_by_a_percent_is_rejected() {
        let low = momentum(0.2, 0.49, 0.3).validate();
        assert!(matches!(low, Err(ConfigError::MomentumFractions { .. })));
        let high = momentum(0.2, 0.51, 0.3).validate();
        assert!(matches!(high, Err(ConfigError::MomentumFractions { .. })));
    }

    #[test]
    fn negative_std_dev_is_rejected() {
        let mut config = test_config();
        config.service_times.queue.std_dev = -1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Distribution { name: "queue", .. })
        ));
    }

    #[test]
    fn zero_ping_interval_is_rejected() {
        let mut config = test_config();
        config.ping_sec = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_menu_is_rejected() {
        let mut config = test_config();
        config.brands[0].items.clear();
        assert!(config.validate().is_err());
    }
}
