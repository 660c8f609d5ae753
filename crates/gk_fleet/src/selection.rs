//! Which locations to run and where their output goes.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use gk_sim::config::{ConfigError, LocationConfig};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("location selection is empty")]
    Empty,
    #[error("unknown location `{name}` (available: {})", available.join(", "))]
    UnknownLocation { name: String, available: Vec<String> },
    #[error("cannot read config directory {path}: {source}")]
    ConfigDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid output segment `{segment}`: {reason}")]
    OutputSegment { segment: String, reason: &'static str },
}

/// `all`, or a comma-separated list of location names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationSelection {
    All,
    Named(Vec<String>),
}

impl FromStr for LocationSelection {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(LocationSelection::All);
        }
        let mut names: Vec<String> = Vec::new();
        for name in trimmed.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        if names.is_empty() {
            return Err(SelectionError::Empty);
        }
        Ok(LocationSelection::Named(names))
    }
}

/// Location names with a `<name>.json` config in `config_dir`, sorted.
pub fn available_locations(config_dir: impl AsRef<Path>) -> Result<Vec<String>, SelectionError> {
    let dir = config_dir.as_ref();
    let entries = fs::read_dir(dir).map_err(|source| SelectionError::ConfigDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .collect();
    names.sort();
    Ok(names)
}

/// Loads and validates every selected config. Any invalid config fails the
/// whole selection before anything runs.
pub fn resolve_configs(
    config_dir: impl AsRef<Path>,
    selection: &LocationSelection,
) -> Result<Vec<LocationConfig>, SelectionError> {
    let dir = config_dir.as_ref();
    let available = available_locations(dir)?;
    let names = match selection {
        LocationSelection::All => available.clone(),
        LocationSelection::Named(names) => {
            if let Some(missing) = names.iter().find(|n| !available.contains(n)) {
                return Err(SelectionError::UnknownLocation {
                    name: missing.clone(),
                    available,
                });
            }
            names.clone()
        }
    };
    if names.is_empty() {
        return Err(SelectionError::Empty);
    }
    names
        .iter()
        .map(|name| {
            LocationConfig::load(dir.join(format!("{name}.json"))).map_err(SelectionError::from)
        })
        .collect()
}

/// `<root>/<catalog>/<schema>/<volume>/`, the landing area for event files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub root: PathBuf,
    pub catalog: String,
    pub schema: String,
    pub volume: String,
}

impl OutputTarget {
    pub fn new(
        root: impl Into<PathBuf>,
        catalog: impl Into<String>,
        schema: impl Into<String>,
        volume: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            catalog: catalog.into(),
            schema: schema.into(),
            volume: volume.into(),
        }
    }

    /// Catalog, schema and volume must be single path segments.
    pub fn validate(&self) -> Result<(), SelectionError> {
        for segment in [&self.catalog, &self.schema, &self.volume] {
            check_segment(segment)?;
        }
        Ok(())
    }

    pub fn volume_dir(&self) -> PathBuf {
        self.root
            .join(&self.catalog)
            .join(&self.schema)
            .join(&self.volume)
    }

    pub fn location_dir(&self, location: &str) -> PathBuf {
        self.volume_dir().join(location)
    }

    /// `<root>/_recovery/<catalog>/<schema>/<volume>/<location>.ndjson`, kept
    /// outside the volume so ingestion never picks it up.
    pub fn recovery_file(&self, location: &str) -> PathBuf {
        self.root
            .join("_recovery")
            .join(&self.catalog)
            .join(&self.schema)
            .join(&self.volume)
            .join(format!("{location}.ndjson"))
    }
}

fn check_segment(segment: &str) -> Result<(), SelectionError> {
    let reason = if segment.trim().is_empty() {
        "must not be empty"
    } else if segment.contains(['/', '\\']) {
        "must not contain path separators"
    } else if segment == "." || segment == ".." {
        "must not be a relative path component"
    } else {
        return Ok(());
    };
    Err(SelectionError::OutputSegment {
        segment: segment.to_string(),
        reason,
    })
}
