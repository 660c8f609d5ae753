//! Order events and their wire records.
//!
//! Inside the simulation an event body is a typed enum; at the writer
//! boundary it becomes an [`EventRecord`] whose body is a JSON-encoded
//! string, one record per NDJSON line.

use std::fmt;
use std::str::FromStr;

use chrono::{SecondsFormat, TimeZone, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::basket::OrderItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    OrderCreated,
    GkStarted,
    GkFinished,
    GkReady,
    DriverArrived,
    DriverPickedUp,
    DriverPing,
    Delivered,
}

impl EventType {
    /// Canonical emission order.
    pub const ALL: [EventType; 8] = [
        EventType::OrderCreated,
        EventType::GkStarted,
        EventType::GkFinished,
        EventType::GkReady,
        EventType::DriverArrived,
        EventType::DriverPickedUp,
        EventType::DriverPing,
        EventType::Delivered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::OrderCreated => "order_created",
            EventType::GkStarted => "gk_started",
            EventType::GkFinished => "gk_finished",
            EventType::GkReady => "gk_ready",
            EventType::DriverArrived => "driver_arrived",
            EventType::DriverPickedUp => "driver_picked_up",
            EventType::DriverPing => "driver_ping",
            EventType::Delivered => "delivered",
        }
    }

    /// Body field names carried by this event type.
    pub fn body_fields(&self) -> &'static [&'static str] {
        match self {
            EventType::OrderCreated => &[
                "brand_id",
                "brand",
                "customer_lat",
                "customer_lon",
                "customer_addr",
                "items",
                "gk_lat",
                "gk_lon",
                "radius_mi",
            ],
            EventType::GkStarted => &["queue_mins"],
            EventType::GkFinished => &["cook_mins"],
            EventType::GkReady => &["package_mins"],
            EventType::DriverArrived => &["gk_lat", "gk_lon"],
            EventType::DriverPickedUp => &["route_points", "route_miles", "eta_mins"],
            EventType::DriverPing => &["loc_lat", "loc_lon", "progress_pct", "eta_mins"],
            EventType::Delivered => &["delivered_lat", "delivered_lon"],
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventType(pub String);

impl fmt::Display for UnknownEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event type `{}`", self.0)
    }
}

impl std::error::Error for UnknownEventType {}

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownEventType(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderCreatedBody {
    pub brand_id: u32,
    pub brand: String,
    pub customer_lat: f64,
    pub customer_lon: f64,
    pub customer_addr: String,
    pub items: Vec<OrderItem>,
    pub gk_lat: f64,
    pub gk_lon: f64,
    pub radius_mi: f64,
}

/// Type-specific event payload. Serializes to a flat JSON object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventBody {
    OrderCreated(OrderCreatedBody),
    GkStarted {
        queue_mins: f64,
    },
    GkFinished {
        cook_mins: f64,
    },
    GkReady {
        package_mins: f64,
    },
    DriverArrived {
        gk_lat: f64,
        gk_lon: f64,
    },
    DriverPickedUp {
        route_points: Vec<[f64; 2]>,
        route_miles: f64,
        eta_mins: f64,
    },
    DriverPing {
        loc_lat: f64,
        loc_lon: f64,
        progress_pct: f64,
        eta_mins: f64,
    },
    Delivered {
        delivered_lat: f64,
        delivered_lon: f64,
    },
}

impl EventBody {
    pub fn event_type(&self) -> EventType {
        match self {
            EventBody::OrderCreated(_) => EventType::OrderCreated,
            EventBody::GkStarted { .. } => EventType::GkStarted,
            EventBody::GkFinished { .. } => EventType::GkFinished,
            EventBody::GkReady { .. } => EventType::GkReady,
            EventBody::DriverArrived { .. } => EventType::DriverArrived,
            EventBody::DriverPickedUp { .. } => EventType::DriverPickedUp,
            EventBody::DriverPing { .. } => EventType::DriverPing,
            EventBody::Delivered { .. } => EventType::Delivered,
        }
    }

    pub fn to_json_map(&self) -> Result<serde_json::Map<String, serde_json::Value>, serde_json::Error> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other);
                Ok(map)
            }
        }
    }
}

/// An event as produced by the lifecycle, before addressing.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderEvent {
    pub event_id: Uuid,
    pub order_id: Uuid,
    pub sequence: u32,
    /// Unix milliseconds.
    pub ts_ms: i64,
    pub body: EventBody,
}

impl OrderEvent {
    pub fn event_type(&self) -> EventType {
        self.body.event_type()
    }

    pub fn into_record(self, gk_id: &str, location: &str) -> Result<EventRecord, serde_json::Error> {
        Ok(EventRecord {
            event_id: self.event_id,
            event_type: self.body.event_type(),
            ts: format_ts(self.ts_ms),
            gk_id: gk_id.to_string(),
            location: location.to_string(),
            order_id: self.order_id,
            sequence: self.sequence,
            body: self.body.to_json_map()?,
        })
    }
}

/// One line of an output file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub ts: String,
    pub gk_id: String,
    pub location: String,
    pub order_id: Uuid,
    pub sequence: u32,
    #[serde(with = "json_string")]
    pub body: serde_json::Map<String, serde_json::Value>,
}

impl EventRecord {
    pub fn to_ndjson_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Body as a JSON-encoded string on the wire.
mod json_string {
    use serde::de::Error as _;
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    type Body = serde_json::Map<String, serde_json::Value>;

    pub fn serialize<S: Serializer>(body: &Body, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = serde_json::to_string(body).map_err(S::Error::custom)?;
        serializer.serialize_str(&encoded)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Body, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        serde_json::from_str(&encoded).map_err(D::Error::custom)
    }
}

/// ISO-8601 UTC with millisecond precision.
pub fn format_ts(unix_ms: i64) -> String {
    match Utc.timestamp_millis_opt(unix_ms).single() {
        Some(ts) => ts.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => unix_ms.to_string(),
    }
}

/// Deterministic v4-style UUID drawn from a seeded RNG.
pub fn uuid_from_rng<R: Rng + ?Sized>(rng: &mut R) -> Uuid {
    let bytes: [u8; 16] = rng.gen();
    uuid::Builder::from_random_bytes(bytes).into_uuid()
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
