//! Test helpers for common test setup and utilities.
//!
//! The sample location is a small Chicago kitchen on a synthetic grid with a
//! fixed anchor, so runs built from it replay identically.

use crate::config::LocationConfig;
use crate::geography::grid::GridGeography;
use crate::geography::{Geography, GeographyProvider};

/// Anchor of the sample config: 02:00 UTC on Tuesday 2024-01-02, so the one
/// lookback day is Monday 2024-01-01.
pub const TEST_ANCHOR: &str = "2024-01-02T02:00:00Z";

/// Raw JSON of the sample location config.
pub fn test_config_json() -> String {
    format!(
        r#"{{
    "location_name": "testville",
    "gk_id": "gk-test-001",
    "kitchen": {{ "lat": 41.8781, "lon": -87.6298, "address": "1 Test Plaza" }},
    "radius_mi": 1.0,
    "simulation": {{
        "start_days_ago": 1,
        "end_days_ahead": 0,
        "speed_up": 60.0,
        "anchor": "{TEST_ANCHOR}"
    }},
    "demand": {{ "orders_day_1": 40.0, "orders_last": 40.0, "noise_pct": 0.0 }},
    "service_times": {{
        "queue": [3.0, 1.0],
        "cook": [10.0, 2.0],
        "package": [2.0, 0.5],
        "driver_wait": [4.0, 1.5]
    }},
    "driver_arrival": {{ "alpha": 2.0, "beta": 5.0, "after_ready_pct": 0.4 }},
    "driver_mph": 15.0,
    "momentum": {{
        "improving": 0.34,
        "flat": 0.33,
        "declining": 0.33,
        "improving_rate": 0.1,
        "declining_rate": 0.05
    }},
    "batching": {{ "batch_rows": 50, "batch_seconds": 5.0 }},
    "ping_sec": 60,
    "random_seed": 42,
    "brands": [
        {{
            "id": 1,
            "name": "Noodle Nook",
            "items": [
                {{ "id": 101, "menu_id": 10, "category_id": 1, "name": "Dan Dan Noodles", "price": 13.5 }},
                {{ "id": 102, "menu_id": 10, "category_id": 2, "name": "Pork Dumplings", "price": 8.0 }}
            ]
        }},
        {{
            "id": 2,
            "name": "Burger Barn",
            "base_weight": 2.0,
            "items": [
                {{ "id": 201, "menu_id": 20, "category_id": 3, "name": "Smash Burger", "price": 11.0, "popularity": 3.0 }},
                {{ "id": 202, "menu_id": 20, "category_id": 4, "name": "Fries", "price": 4.5, "popularity": 1.0 }}
            ]
        }},
        {{
            "id": 3,
            "name": "Taco Stand",
            "items": [
                {{ "id": 301, "menu_id": 30, "category_id": 5, "name": "Al Pastor Taco", "price": 3.75 }}
            ]
        }}
    ],
    "basket": {{ "min_items": 1, "max_items": 3, "max_qty": 2 }},
    "geography": {{ "source": "grid", "spacing_m": 200.0, "address_fraction": 0.6 }}
}}"#
    )
}

/// Parsed and validated sample config.
///
/// # Panics
///
/// Panics if the sample JSON is invalid (should never happen).
pub fn test_config() -> LocationConfig {
    LocationConfig::from_json_str(&test_config_json(), "test_helpers")
        .expect("sample config should be valid")
}

/// Grid geography of the sample config.
///
/// # Panics
///
/// Panics if the grid cannot be built (should never happen).
pub fn test_geography() -> Geography {
    GridGeography::new(200.0, 0.6)
        .load(&test_config())
        .expect("sample grid should load")
}
