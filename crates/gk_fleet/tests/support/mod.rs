#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Arc;

use gk_fleet::FleetOptions;
use gk_sim::clock::SteppedWallClock;
use gk_sim::runner::RunOptions;
use gk_sim::test_helpers::test_config_json;

/// Writes the sample config under `<dir>/<name>.json` with `name` as its
/// location.
pub fn write_config(dir: &Path, name: &str, seed: u64) {
    let json = test_config_json()
        .replace("\"testville\"", &format!("\"{name}\""))
        .replace("\"random_seed\": 42", &format!("\"random_seed\": {seed}"));
    fs::write(dir.join(format!("{name}.json")), json).expect("write config");
}

/// Same as [`write_config`] but with a geography file that does not exist.
pub fn write_config_with_missing_geography(dir: &Path, name: &str) {
    let json = test_config_json()
        .replace("\"testville\"", &format!("\"{name}\""))
        .replace(
            r#""geography": { "source": "grid", "spacing_m": 200.0, "address_fraction": 0.6 }"#,
            r#""geography": { "source": "file", "path": "/definitely/not/here/roads.json" }"#,
        );
    fs::write(dir.join(format!("{name}.json")), json).expect("write config");
}

pub fn stepped_fleet_options() -> FleetOptions {
    FleetOptions {
        threads: Some(2),
        show_progress: false,
        run: RunOptions {
            wall_clock: Arc::new(SteppedWallClock::new()),
            ..RunOptions::default()
        },
    }
}
