#![allow(dead_code)]

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use gk_sim::event::{EventRecord, EventType};
use gk_sim::writer::MemorySink;
use uuid::Uuid;

/// Every record the sink received, in flush order.
pub fn parse_records(payload: &[u8]) -> Vec<EventRecord> {
    std::str::from_utf8(payload)
        .expect("utf-8 payload")
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).expect("record line"))
        .collect()
}

pub fn sink_records(sink: &MemorySink) -> Vec<EventRecord> {
    parse_records(&sink.concatenated())
}

/// Records grouped by order, each group in stream order.
pub fn by_order(records: &[EventRecord]) -> BTreeMap<Uuid, Vec<EventRecord>> {
    let mut orders: BTreeMap<Uuid, Vec<EventRecord>> = BTreeMap::new();
    for record in records {
        orders.entry(record.order_id).or_default().push(record.clone());
    }
    orders
}

pub fn ts(record: &EventRecord) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&record.ts)
        .expect("rfc3339 ts")
        .with_timezone(&Utc)
}

pub fn find(events: &[EventRecord], event_type: EventType) -> &EventRecord {
    events
        .iter()
        .find(|e| e.event_type == event_type)
        .unwrap_or_else(|| panic!("missing {event_type}"))
}

pub fn body_f64(record: &EventRecord, field: &str) -> f64 {
    record
        .body
        .get(field)
        .and_then(|v| v.as_f64())
        .unwrap_or_else(|| panic!("{} has no numeric `{field}`", record.event_type))
}
