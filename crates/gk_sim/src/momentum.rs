//! Brand trend classes and time-varying selection weights.

use bevy_ecs::prelude::Resource;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::config::{BrandConfig, MomentumParams};
use crate::weighting::WeightedTable;

/// Days over which a momentum rate compounds once.
pub const MOMENTUM_PERIOD_DAYS: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendClass {
    Improving,
    Flat,
    Declining,
}

#[derive(Debug, Clone)]
pub struct BrandTrend {
    pub brand_id: u32,
    pub base_weight: f64,
    pub class: TrendClass,
}

#[derive(Debug, Clone, Resource)]
pub struct BrandMomentum {
    trends: Vec<BrandTrend>,
    improving_rate: f64,
    declining_rate: f64,
}

/// Splits `n` into per-class counts proportional to `fractions` using the
/// largest-remainder method. Ties go to the earlier class.
pub fn apportion(n: usize, fractions: [f64; 3]) -> [usize; 3] {
    let quotas = fractions.map(|f| f.max(0.0) * n as f64);
    let mut counts = quotas.map(|q| q.floor() as usize);
    let assigned: usize = counts.iter().sum();
    let mut leftover = n.saturating_sub(assigned);

    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| {
        let ra = quotas[a] - quotas[a].floor();
        let rb = quotas[b] - quotas[b].floor();
        rb.total_cmp(&ra).then(a.cmp(&b))
    });
    for idx in order.into_iter().cycle() {
        if leftover == 0 {
            break;
        }
        counts[idx] += 1;
        leftover -= 1;
    }
    counts
}

impl BrandMomentum {
    /// Assigns exactly one class per brand. Brand order is shuffled with
    /// `rng` before the apportioned classes are handed out.
    pub fn assign<R: Rng + ?Sized>(
        brands: &[BrandConfig],
        params: &MomentumParams,
        rng: &mut R,
    ) -> Self {
        let [improving, flat, _] =
            apportion(brands.len(), [params.improving, params.flat, params.declining]);

        let mut order: Vec<usize> = (0..brands.len()).collect();
        order.shuffle(rng);

        let mut classes = vec![TrendClass::Flat; brands.len()];
        for (position, &brand_idx) in order.iter().enumerate() {
            classes[brand_idx] = if position < improving {
                TrendClass::Improving
            } else if position < improving + flat {
                TrendClass::Flat
            } else {
                TrendClass::Declining
            };
        }

        let trends = brands
            .iter()
            .zip(classes)
            .map(|(brand, class)| BrandTrend {
                brand_id: brand.id,
                base_weight: brand.base_weight,
                class,
            })
            .collect();
        Self {
            trends,
            improving_rate: params.improving_rate,
            declining_rate: params.declining_rate,
        }
    }

    pub fn trends(&self) -> &[BrandTrend] {
        &self.trends
    }

    /// Selection weight of brand `brand_idx` on day `day`.
    pub fn weight(&self, brand_idx: usize, day: u32) -> f64 {
        let Some(trend) = self.trends.get(brand_idx) else {
            return 0.0;
        };
        let periods = day as f64 / MOMENTUM_PERIOD_DAYS;
        match trend.class {
            TrendClass::Improving => trend.base_weight * (1.0 + self.improving_rate).powf(periods),
            TrendClass::Flat => trend.base_weight,
            TrendClass::Declining => trend.base_weight * (1.0 - self.declining_rate).powf(periods),
        }
    }

    /// Index of a brand drawn proportionally to its weight on `day`.
    pub fn sample_brand<R: Rng + ?Sized>(&self, day: u32, rng: &mut R) -> Option<usize> {
        WeightedTable::new((0..self.trends.len()).map(|idx| self.weight(idx, day))).sample(rng)
    }
}
