//! Multi-location execution for the ghost-kitchen event simulator.
//!
//! Each selected location runs independently (own clock, RNG and writer) on a
//! rayon worker. Output lands under
//! `<output_root>/<catalog>/<schema>/<volume>/<location>/`, and a run summary
//! per location can be exported to JSON, CSV and Parquet.
//!
//! # Quick Start
//!
//! ```no_run
//! use gk_fleet::{resolve_configs, run_fleet, FleetOptions, LocationSelection, OutputTarget};
//!
//! let selection: LocationSelection = "sanfrancisco,chicago".parse().unwrap();
//! let configs = resolve_configs("configs", &selection).unwrap();
//! let target = OutputTarget::new("/tmp/out", "gk_demo", "bronze", "events");
//! let report = run_fleet(&configs, &target, &FleetOptions::default()).unwrap();
//! println!("{} locations ran", report.runs.len());
//! ```

pub mod export;
pub mod metrics;
pub mod runner;
pub mod selection;

pub use export::{export_to_csv, export_to_json, export_to_parquet, export_unflushed_events};
pub use metrics::{summarize, LocationSummary};
pub use runner::{run_fleet, run_fleet_with_sinks, FleetError, FleetOptions, FleetReport, LocationFailure};
pub use selection::{available_locations, resolve_configs, LocationSelection, OutputTarget, SelectionError};
