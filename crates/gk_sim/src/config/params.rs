use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::corruption::CorruptionRule;

/// Default lookback window when a config omits `start_days_ago`.
const DEFAULT_START_DAYS_AGO: u32 = 1;
/// Default acceleration factor: one simulated minute per real second.
const DEFAULT_SPEED_UP: f64 = 60.0;

/// Immutable per-location configuration, loaded once from JSON at simulation start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    /// Short location key, e.g. `"sanfrancisco"`. Copied into every event record.
    pub location_name: String,
    /// Ghost-kitchen identifier copied into every event record.
    pub gk_id: String,
    pub kitchen: KitchenSite,
    /// Delivery radius around the kitchen in miles.
    pub radius_mi: f64,
    #[serde(default)]
    pub simulation: SimulationParams,
    pub demand: DemandParams,
    pub service_times: ServiceTimes,
    pub driver_arrival: DriverArrivalParams,
    pub driver_mph: f64,
    pub momentum: MomentumParams,
    #[serde(default)]
    pub batching: BatchingParams,
    /// Simulated seconds between `driver_ping` events.
    pub ping_sec: u64,
    pub random_seed: u64,
    #[serde(default)]
    pub corruption: Vec<CorruptionRule>,
    pub brands: Vec<BrandConfig>,
    #[serde(default)]
    pub basket: BasketParams,
    #[serde(default)]
    pub geography: GeographySource,
    /// Relative sampling weight of delivery points that carry a street address.
    #[serde(default = "default_address_weight")]
    pub address_weight: f64,
}

fn default_address_weight() -> f64 {
    4.0
}

/// Kitchen geocode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KitchenSite {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub address: Option<String>,
}

/// Simulation window and acceleration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationParams {
    #[serde(default = "default_start_days_ago")]
    pub start_days_ago: u32,
    #[serde(default)]
    pub end_days_ahead: u32,
    /// Simulated seconds per wall-clock second during the live phase.
    #[serde(default = "default_speed_up")]
    pub speed_up: f64,
    /// Fixed "now" for the run. When absent the wall clock at start is used,
    /// which makes event timestamps differ between runs.
    #[serde(default)]
    pub anchor: Option<DateTime<Utc>>,
}

fn default_start_days_ago() -> u32 {
    DEFAULT_START_DAYS_AGO
}

fn default_speed_up() -> f64 {
    DEFAULT_SPEED_UP
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            start_days_ago: DEFAULT_START_DAYS_AGO,
            end_days_ahead: 0,
            speed_up: DEFAULT_SPEED_UP,
            anchor: None,
        }
    }
}

/// Daily order volume curve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemandParams {
    pub orders_day_1: f64,
    pub orders_last: f64,
    /// Half-width of the uniform multiplicative noise, e.g. `0.1` for ±10%.
    #[serde(default)]
    pub noise_pct: f64,
}

/// A Gaussian given in JSON as `[mean, std_dev]` (minutes).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "[f64; 2]")]
pub struct MeanStd {
    pub mean: f64,
    pub std_dev: f64,
}

impl TryFrom<Vec<f64>> for MeanStd {
    type Error = String;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        match values.as_slice() {
            [mean, std_dev] => Ok(Self {
                mean: *mean,
                std_dev: *std_dev,
            }),
            other => Err(format!(
                "expected [mean, std_dev], got {} value(s)",
                other.len()
            )),
        }
    }
}

impl From<MeanStd> for [f64; 2] {
    fn from(value: MeanStd) -> Self {
        [value.mean, value.std_dev]
    }
}

/// The four kitchen/driver service-time distributions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceTimes {
    pub queue: MeanStd,
    pub cook: MeanStd,
    pub package: MeanStd,
    pub driver_wait: MeanStd,
}

/// Beta-distributed driver arrival relative to the kitchen timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverArrivalParams {
    pub alpha: f64,
    pub beta: f64,
    /// Probability that the driver arrives after the food is ready.
    pub after_ready_pct: f64,
}

/// Brand trend mixture. Fractions must sum to 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentumParams {
    pub improving: f64,
    pub flat: f64,
    pub declining: f64,
    /// Monthly compounding growth for improving brands.
    #[serde(default)]
    pub improving_rate: f64,
    /// Monthly compounding decay for declining brands.
    #[serde(default)]
    pub declining_rate: f64,
}

/// Writer flush thresholds and retry budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchingParams {
    pub batch_rows: usize,
    /// Real (wall-clock) seconds an unflushed event may wait.
    pub batch_seconds: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_backoff_ms() -> u64 {
    200
}

impl Default for BatchingParams {
    fn default() -> Self {
        Self {
            batch_rows: 500,
            batch_seconds: 5.0,
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// One brand and its menu.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandConfig {
    pub id: u32,
    pub name: String,
    #[serde(default = "default_base_weight")]
    pub base_weight: f64,
    pub items: Vec<MenuItem>,
}

fn default_base_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: u32,
    pub menu_id: u32,
    pub category_id: u32,
    pub name: String,
    pub price: f64,
    /// Relative popularity. When any item of a brand sets it, items are drawn
    /// proportionally; missing values count as 1.0.
    #[serde(default)]
    pub popularity: Option<f64>,
}

/// Shape of a sampled basket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasketParams {
    pub min_items: u32,
    pub max_items: u32,
    pub max_qty: u32,
}

impl Default for BasketParams {
    fn default() -> Self {
        Self {
            min_items: 1,
            max_items: 3,
            max_qty: 2,
        }
    }
}

/// Where the delivery road network comes from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum GeographySource {
    /// Synthetic street grid centred on the kitchen.
    Grid {
        #[serde(default = "default_grid_spacing_m")]
        spacing_m: f64,
        #[serde(default = "default_address_fraction")]
        address_fraction: f64,
    },
    /// Road network document on disk (see `geography::file`).
    File { path: PathBuf },
    /// Live OpenStreetMap extract from an Overpass endpoint.
    #[cfg(feature = "overpass")]
    Overpass { endpoint: String },
}

fn default_grid_spacing_m() -> f64 {
    160.0
}

fn default_address_fraction() -> f64 {
    0.6
}

impl Default for GeographySource {
    fn default() -> Self {
        GeographySource::Grid {
            spacing_m: default_grid_spacing_m(),
            address_fraction: default_address_fraction(),
        }
    }
}
