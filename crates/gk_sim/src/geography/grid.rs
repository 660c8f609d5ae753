//! Synthetic street grid centred on the kitchen.
//!
//! Used when no real road extract is configured. Blocks are `spacing_m`
//! apart; a deterministic subset of intersections carries a street address
//! so the address weighting still has something to bias toward.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{
    kitchen_point, Geography, GeographyError, GeographyProvider, RoadNetwork, METERS_PER_MILE,
};
use crate::config::LocationConfig;

/// Mixed into the location seed so the grid does not share a stream with
/// the order simulation.
const GRID_SEED_SALT: u64 = 0x6772_6964_5f61_6464;

const STREET_NAMES: [&str; 12] = [
    "Oak", "Pine", "Maple", "Cedar", "Elm", "Walnut", "Birch", "Spruce", "Willow", "Chestnut",
    "Laurel", "Hawthorne",
];

#[derive(Debug, Clone)]
pub struct GridGeography {
    spacing_m: f64,
    address_fraction: f64,
}

impl GridGeography {
    pub fn new(spacing_m: f64, address_fraction: f64) -> Self {
        Self {
            spacing_m,
            address_fraction: address_fraction.clamp(0.0, 1.0),
        }
    }

    /// Square grid covering `radius_m` around the kitchen. The caller trims
    /// it to the radius.
    pub fn build_network(&self, config: &LocationConfig, radius_m: f64) -> Result<RoadNetwork, GeographyError> {
        if !(self.spacing_m > 0.0) {
            return Err(GeographyError::Parse {
                origin: "grid".to_string(),
                reason: format!("spacing_m must be > 0, got {}", self.spacing_m),
            });
        }
        let center = kitchen_point(config);
        let half = (radius_m / self.spacing_m).ceil() as i64;
        let side = (2 * half + 1) as usize;
        let mut rng = StdRng::seed_from_u64(config.random_seed ^ GRID_SEED_SALT);
        let mut builder = RoadNetwork::builder();

        let mut ids = Vec::with_capacity(side * side);
        for row in -half..=half {
            for col in -half..=half {
                let point =
                    center.offset_m(row as f64 * self.spacing_m, col as f64 * self.spacing_m);
                let address = rng
                    .gen_bool(self.address_fraction)
                    .then(|| street_address(row + half, col + half, &config.location_name));
                ids.push(builder.add_node(point, address));
            }
        }

        let at = |row: usize, col: usize| ids[row * side + col];
        for row in 0..side {
            for col in 0..side {
                if col + 1 < side {
                    builder.add_edge(at(row, col), at(row, col + 1), Some(self.spacing_m));
                }
                if row + 1 < side {
                    builder.add_edge(at(row, col), at(row + 1, col), Some(self.spacing_m));
                }
            }
        }
        Ok(builder.build())
    }
}

fn street_address(row: i64, col: i64, location: &str) -> String {
    let street = STREET_NAMES[(row as usize) % STREET_NAMES.len()];
    let house = 100 + col * 100 + (row % 7) * 2;
    format!("{house} {street} St, {location}")
}

impl GeographyProvider for GridGeography {
    fn load(&self, config: &LocationConfig) -> Result<Geography, GeographyError> {
        let radius_m = config.radius_mi * METERS_PER_MILE;
        let network = self.build_network(config, radius_m)?;
        Geography::from_network(network, kitchen_point(config), radius_m, config.address_weight)
    }
}
