mod support;

use std::fs;

use gk_fleet::{
    available_locations, export_to_json, resolve_configs, run_fleet, summarize, LocationSelection,
    OutputTarget, SelectionError,
};
use support::{stepped_fleet_options, write_config, write_config_with_missing_geography};

#[test]
fn all_selects_every_config_in_name_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_config(dir.path(), "houston", 1);
    write_config(dir.path(), "chicago", 2);
    fs::write(dir.path().join("notes.txt"), "not a config").expect("write");

    assert_eq!(
        available_locations(dir.path()).expect("list"),
        vec!["chicago".to_string(), "houston".to_string()]
    );
    let configs = resolve_configs(dir.path(), &LocationSelection::All).expect("configs");
    let names: Vec<&str> = configs.iter().map(|c| c.location_name.as_str()).collect();
    assert_eq!(names, vec!["chicago", "houston"]);
}

#[test]
fn unknown_location_fails_the_selection() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_config(dir.path(), "chicago", 1);
    let selection: LocationSelection = "chicago,atlantis".parse().expect("selection");
    let err = resolve_configs(dir.path(), &selection).expect_err("must fail");
    assert!(matches!(err, SelectionError::UnknownLocation { ref name, .. } if name == "atlantis"));
}

#[test]
fn invalid_config_fails_before_anything_runs() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_config(dir.path(), "chicago", 1);
    let bad = support_bad_momentum();
    fs::write(dir.path().join("houston.json"), bad).expect("write");
    let err = resolve_configs(dir.path(), &LocationSelection::All).expect_err("must fail");
    assert!(matches!(err, SelectionError::Config(_)), "{err}");
}

fn support_bad_momentum() -> String {
    gk_sim::test_helpers::test_config_json().replace("\"improving\": 0.34", "\"improving\": 0.33")
}

#[test]
fn fleet_writes_each_location_under_its_volume_directory() {
    let configs_dir = tempfile::tempdir().expect("tempdir");
    let out = tempfile::tempdir().expect("tempdir");
    write_config(configs_dir.path(), "chicago", 1);
    write_config(configs_dir.path(), "houston", 2);
    let configs = resolve_configs(configs_dir.path(), &LocationSelection::All).expect("configs");
    let target = OutputTarget::new(out.path(), "gk_demo", "bronze", "events");

    let report = run_fleet(&configs, &target, &stepped_fleet_options()).expect("fleet");
    assert!(report.is_success());

    for run in &report.runs {
        let dir = out
            .path()
            .join("gk_demo")
            .join("bronze")
            .join("events")
            .join(&run.location);
        let files = fs::read_dir(&dir).expect("location dir").count() as u64;
        assert_eq!(files, run.writer.flushes);
        assert!(run.telemetry.events_emitted > 0);
    }

    let summaries: Vec<_> = report.runs.iter().map(summarize).collect();
    assert!(summaries.iter().all(|s| s.p50_total_minutes <= s.p99_total_minutes));
    let summary_path = out.path().join("summary").join("run_summary.json");
    export_to_json(&summaries, &summary_path).expect("export");
    assert!(summary_path.exists());
}

#[test]
fn geography_failure_is_isolated_to_its_location() {
    let configs_dir = tempfile::tempdir().expect("tempdir");
    let out = tempfile::tempdir().expect("tempdir");
    write_config(configs_dir.path(), "chicago", 1);
    write_config_with_missing_geography(configs_dir.path(), "nowhere");
    let configs = resolve_configs(configs_dir.path(), &LocationSelection::All).expect("configs");
    let target = OutputTarget::new(out.path(), "gk", "bronze", "events");

    let report = run_fleet(&configs, &target, &stepped_fleet_options()).expect("fleet");
    assert_eq!(report.runs.len(), 1);
    assert_eq!(report.runs[0].location, "chicago");
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].location, "nowhere");
    assert!(report.failures[0].error.contains("geography"));
}

#[test]
fn shipped_configs_are_valid() {
    let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/../../configs");
    let configs = resolve_configs(dir, &LocationSelection::All).expect("shipped configs");
    let names: Vec<&str> = configs.iter().map(|c| c.location_name.as_str()).collect();
    assert_eq!(names, vec!["chicago", "houston", "houston_westside", "sanfrancisco"]);
}
