//! Location configuration: JSON loading and startup validation.
//!
//! A run reads one JSON document per location. Anything malformed (momentum
//! fractions that do not sum to one, distribution arrays of the wrong shape,
//! corruption rules naming unknown fields) is rejected here so the
//! simulation never starts with a config it cannot honour.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

mod params;
mod validate;

pub use params::{
    BasketParams, BatchingParams, BrandConfig, DemandParams, DriverArrivalParams,
    GeographySource, KitchenSite, LocationConfig, MeanStd, MenuItem, MomentumParams,
    ServiceTimes, SimulationParams,
};
pub use validate::MOMENTUM_SUM_TOLERANCE;

/// Errors raised while loading or validating a location config. All of them
/// are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("momentum fractions must sum to 1.0 (got {sum})")]
    MomentumFractions { sum: f64 },
    #[error("invalid distribution `{name}`: {reason}")]
    Distribution { name: &'static str, reason: String },
    #[error("invalid corruption rule {event_type}.{field}: {reason}")]
    Corruption {
        event_type: String,
        field: String,
        reason: String,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl LocationConfig {
    /// Parse and validate a config from a JSON string. `origin` names the
    /// source in error messages.
    pub fn from_json_str(json: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: LocationConfig =
            serde_json::from_str(json).map_err(|source| ConfigError::Parse {
                origin: origin.to_string(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json, &path.display().to_string())
    }
}
