mod support;

use gk_sim::event::EventType;
use gk_sim::runner::StopReason;
use gk_sim::test_helpers::test_config;
use support::records::{body_f64, by_order, find, sink_records, ts};
use support::run::{run_in_memory, stepped_options};

const KITCHEN_CHAIN: [EventType; 4] = [
    EventType::OrderCreated,
    EventType::GkStarted,
    EventType::GkFinished,
    EventType::GkReady,
];

#[test]
fn every_order_follows_the_canonical_sequence() {
    let (run, sink) = run_in_memory(&test_config(), &stepped_options());
    assert_eq!(run.stop_reason, StopReason::WindowEnd);
    let records = sink_records(&sink);
    let orders = by_order(&records);
    assert_eq!(orders.len() as u64, run.telemetry.orders_admitted);
    assert!(!orders.is_empty());

    for events in orders.values() {
        let types: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(&types[..4], &KITCHEN_CHAIN);
        assert_eq!(types[4], EventType::DriverArrived);
        assert_eq!(types[5], EventType::DriverPickedUp);
        assert_eq!(types.last(), Some(&EventType::Delivered));
        assert!(types[6..types.len() - 1]
            .iter()
            .all(|t| *t == EventType::DriverPing));

        let sequences: Vec<u32> = events.iter().map(|e| e.sequence).collect();
        let expected: Vec<u32> = (0..events.len() as u32).collect();
        assert_eq!(sequences, expected, "sequence numbers must be gap-free");
    }
}

#[test]
fn timestamps_respect_lifecycle_ordering() {
    let (_, sink) = run_in_memory(&test_config(), &stepped_options());
    let records = sink_records(&sink);

    for events in by_order(&records).values() {
        let created = ts(find(events, EventType::OrderCreated));
        let started = ts(find(events, EventType::GkStarted));
        let finished = ts(find(events, EventType::GkFinished));
        let ready = ts(find(events, EventType::GkReady));
        let arrived = ts(find(events, EventType::DriverArrived));
        let picked_up = ts(find(events, EventType::DriverPickedUp));
        let delivered = ts(find(events, EventType::Delivered));

        assert!(started >= created);
        assert!(finished >= started);
        assert!(ready >= finished);
        assert!(picked_up >= ready);
        assert!(arrived >= created);
        assert!(delivered >= picked_up);

        let mut previous = picked_up;
        for ping in events.iter().filter(|e| e.event_type == EventType::DriverPing) {
            let at = ts(ping);
            assert!(at >= previous);
            assert!(at <= delivered);
            previous = at;
        }
    }
}

#[test]
fn pings_progress_toward_the_customer() {
    let (_, sink) = run_in_memory(&test_config(), &stepped_options());
    let records = sink_records(&sink);

    let mut orders_with_pings = 0;
    for events in by_order(&records).values() {
        let progress: Vec<f64> = events
            .iter()
            .filter(|e| e.event_type == EventType::DriverPing)
            .map(|e| body_f64(e, "progress_pct"))
            .collect();
        if progress.is_empty() {
            continue;
        }
        orders_with_pings += 1;
        assert!(progress.windows(2).all(|w| w[1] > w[0]), "{progress:?}");
        assert!(progress.iter().all(|p| *p > 0.0 && *p <= 100.0));

        let picked_up = find(events, EventType::DriverPickedUp);
        let route_eta = body_f64(picked_up, "eta_mins");
        let etas: Vec<f64> = events
            .iter()
            .filter(|e| e.event_type == EventType::DriverPing)
            .map(|e| body_f64(e, "eta_mins"))
            .collect();
        assert!(etas.iter().all(|eta| *eta <= route_eta + 1e-9));
    }
    assert!(orders_with_pings > 0);
}

#[test]
fn records_carry_location_addressing() {
    let config = test_config();
    let (_, sink) = run_in_memory(&config, &stepped_options());
    let records = sink_records(&sink);

    for record in &records {
        assert_eq!(record.gk_id, config.gk_id);
        assert_eq!(record.location, config.location_name);
        assert!(record.ts.ends_with('Z'));
        for field in record.event_type.body_fields() {
            assert!(
                record.body.contains_key(*field),
                "{} lacks {field}",
                record.event_type
            );
        }
    }

    let created = records
        .iter()
        .find(|r| r.event_type == EventType::OrderCreated)
        .expect("an order");
    let items = created.body["items"].as_array().expect("items");
    assert!(!items.is_empty() && items.len() <= config.basket.max_items as usize);
    assert_eq!(body_f64(created, "radius_mi"), config.radius_mi);
}

#[test]
fn stream_order_matches_sequence_order_per_order() {
    let (_, sink) = run_in_memory(&test_config(), &stepped_options());
    let records = sink_records(&sink);
    let mut last_seen = std::collections::HashMap::new();
    for record in &records {
        let expected = last_seen
            .get(&record.order_id)
            .map(|seq: &u32| seq + 1)
            .unwrap_or(0);
        assert_eq!(record.sequence, expected);
        last_seen.insert(record.order_id, record.sequence);
    }
}
