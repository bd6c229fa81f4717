//! ==============================================================================
//! seed.rs - synthetic history for empty zones
//! ==============================================================================
//!
//! purpose:
//!     a zone that starts without any stored data gets a plausible history so
//!     the dashboard charts have something to draw on first boot.
//!
//! shape:
//!     SEED_COUNT readings, SEED_SPACING apart, oldest first, the last one
//!     stamped at `now`. values are the zone's climate profile plus uniform
//!     noise of ±TEMPERATURE_SPREAD °C and ±HUMIDITY_SPREAD %RH.
//!
//! ordering:
//!     oldest first, so the seeded history and later readings form one
//!     chronological log. `/api/measurements/*` therefore starts with the
//!     oldest seeded reading, not "now"; a dashboard that wants the newest
//!     value first has to read from the end of the array.
//!
//! ==============================================================================

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde_json::{Map, Value};

use crate::domain::{format_timestamp, Reading, Zone};

pub const SEED_COUNT: usize = 100;
pub const SEED_SPACING_MINUTES: i64 = 30;
pub const TEMPERATURE_SPREAD: f64 = 1.5;
pub const HUMIDITY_SPREAD: f64 = 5.0;

pub fn synthetic_history<R: Rng>(zone: Zone, now: DateTime<Utc>, rng: &mut R) -> Vec<Reading> {
    let profile = zone.climate_profile();

    (0..SEED_COUNT)
        .rev()
        .map(|steps_back| {
            let at = now - Duration::minutes(SEED_SPACING_MINUTES * steps_back as i64);
            let temperature = profile.temperature_c + rng.random_range(-TEMPERATURE_SPREAD..TEMPERATURE_SPREAD);
            let humidity = profile.humidity_pct + rng.random_range(-HUMIDITY_SPREAD..HUMIDITY_SPREAD);

            let mut fields = Map::new();
            fields.insert("temperature".to_string(), Value::from(temperature));
            fields.insert("humidity".to_string(), Value::from(humidity));

            Reading { timestamp: format_timestamp(at), fields }
        })
        .collect()
}
