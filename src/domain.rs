//! ==============================================================================
//! domain.rs - zones and readings
//! ==============================================================================
//!
//! purpose:
//!     the two grow-tent zones and the reading records stored for them.
//!
//! relationships:
//!     - used by: store.rs (zone logs), seed.rs (synthetic history)
//!     - used by: server.rs, channel.rs (routing by zone and event name)
//!
//! ==============================================================================

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// one monitored enclosure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Zone {
    /// flowering tent (zone a)
    Bluetezelt,
    /// vegetative / seedling tent (zone b)
    Aufzuchtszelt,
}

/// centre values used when synthesizing history for a zone
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClimateProfile {
    pub temperature_c: f64,
    pub humidity_pct: f64,
}

impl Zone {
    pub const ALL: [Zone; 2] = [Zone::Bluetezelt, Zone::Aufzuchtszelt];

    /// url segment and data file stem
    pub fn slug(self) -> &'static str {
        match self {
            Zone::Bluetezelt => "bluetezelt",
            Zone::Aufzuchtszelt => "aufzuchtszelt",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Zone::Bluetezelt => "Blütezelt",
            Zone::Aufzuchtszelt => "Aufzuchtszelt",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.json", self.slug())
    }

    /// websocket event a sensor uses to submit a reading for this zone
    pub fn inbound_event(self) -> &'static str {
        match self {
            Zone::Bluetezelt => "humidityData",
            Zone::Aufzuchtszelt => "humidityDataSensor2",
        }
    }

    /// websocket event viewers receive when this zone gets a reading
    pub fn outbound_event(self) -> &'static str {
        match self {
            Zone::Bluetezelt => "updateHumidity",
            Zone::Aufzuchtszelt => "updateHumiditySensor2",
        }
    }

    pub fn from_inbound_event(event: &str) -> Option<Zone> {
        Zone::ALL.into_iter().find(|zone| zone.inbound_event() == event)
    }

    pub fn climate_profile(self) -> ClimateProfile {
        match self {
            Zone::Bluetezelt => ClimateProfile { temperature_c: 25.0, humidity_pct: 60.0 },
            Zone::Aufzuchtszelt => ClimateProfile { temperature_c: 23.0, humidity_pct: 70.0 },
        }
    }
}

/// a stored reading
///
/// sensors are not validated, so everything except the timestamp is kept as
/// the raw json the sender supplied. typical contents:
/// - {"temperature": 24.5, "humidity": 55}
/// - {"temperature": 23.1, "humidity": 68.2, "battery": 3.7}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// server-assigned rfc 3339 utc timestamp
    #[serde(default)]
    pub timestamp: String,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Reading {
    /// build a stored reading from a raw ingest payload
    ///
    /// any client-supplied `timestamp` is discarded. a payload that is not a
    /// json object is kept whole under the `payload` key.
    pub fn stamped(payload: &Value, timestamp: String) -> Self {
        let mut fields = into_fields(payload.clone());
        fields.remove("timestamp");
        Self { timestamp, fields }
    }

    /// rebuild a reading from one entry of a zone file
    ///
    /// files written by older servers may hold entries that are not objects,
    /// or timestamps that are not strings. those are kept rather than
    /// rejected: non-objects go under `payload` with no timestamp, and a
    /// non-string timestamp is kept as its json text.
    pub fn from_stored(entry: Value) -> Self {
        let mut fields = into_fields(entry);
        let timestamp = match fields.remove("timestamp") {
            Some(Value::String(timestamp)) => timestamp,
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        Self { timestamp, fields }
    }

    pub fn temperature(&self) -> Option<f64> {
        self.fields.get("temperature").and_then(Value::as_f64)
    }

    pub fn humidity(&self) -> Option<f64> {
        self.fields.get("humidity").and_then(Value::as_f64)
    }
}

fn into_fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("payload".to_string(), other);
            map
        }
    }
}

/// timestamp format used for every stored reading, e.g. `2024-05-01T12:00:00.000Z`
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}
