// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Live aircraft position snapshots.
//!
//! A snapshot is the server's authoritative view of every aircraft currently
//! in range. It replaces the previous snapshot whole; nothing is merged.

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::normalize_identity;
use crate::protocol::events::AircraftSnapshotPush;

const NAUTICAL_MILE_CONVERSION: f64 = 1.15078; // 1 nautical mile = 1.15078 statute miles

/// Distance in nautical miles between two lat/lon points (Haversine).
#[must_use]
pub fn haversine_distance_nm(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let r = 3958.8; // Earth's radius in miles

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    r * c / NAUTICAL_MILE_CONVERSION
}

/// One aircraft position report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AircraftPosition {
    /// ICAO 24-bit address (hex string).
    pub hex: String,
    #[serde(default)]
    pub flight: Option<String>,
    #[serde(default, alias = "r")]
    pub tail: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    /// Altitude in feet. Some feeds send the string "ground" here.
    #[serde(default, alias = "alt_baro", deserialize_with = "de_altitude")]
    pub altitude: Option<i32>,
    /// Ground speed in knots.
    #[serde(default, alias = "gs")]
    pub speed: Option<f64>,
    /// Track angle in degrees (0-360, north = 0).
    #[serde(default, alias = "track")]
    pub heading: Option<f64>,
    #[serde(default)]
    pub squawk: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

fn de_altitude<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().and_then(|v| i32::try_from(v).ok()),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("ground") => Some(0),
        _ => None,
    })
}

impl AircraftPosition {
    fn normalize(mut self) -> Option<Self> {
        self.hex = normalize_identity(&self.hex)?;
        self.flight = self.flight.as_deref().and_then(normalize_identity);
        self.tail = self.tail.as_deref().and_then(normalize_identity);
        Some(self)
    }

    /// Distance in nautical miles from a given point, if the position is known.
    #[must_use]
    pub fn distance_from_nm(&self, from_lat: f64, from_lon: f64) -> Option<f64> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some(haversine_distance_nm(from_lat, from_lon, lat, lon)),
            _ => None,
        }
    }
}

/// Point-in-time set of aircraft positions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AircraftSnapshot {
    /// Snapshot time, seconds since the epoch.
    pub now: f64,
    pub aircraft: Vec<AircraftPosition>,
}

impl AircraftSnapshot {
    /// Build a snapshot from a validated push, dropping entries that don't
    /// carry a usable hex address.
    #[must_use]
    pub fn from_push(push: AircraftSnapshotPush) -> Self {
        let mut aircraft = Vec::with_capacity(push.aircraft.len());
        for entry in push.aircraft {
            match serde_json::from_value::<AircraftPosition>(entry) {
                Ok(position) => match position.normalize() {
                    Some(position) => aircraft.push(position),
                    None => warn!("Dropping aircraft entry with empty hex"),
                },
                Err(e) => warn!("Dropping malformed aircraft entry: {}", e),
            }
        }
        Self { now: push.now, aircraft }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.aircraft.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.aircraft.is_empty()
    }

    #[must_use]
    pub fn get_by_hex(&self, hex: &str) -> Option<&AircraftPosition> {
        let hex = normalize_identity(hex)?;
        self.aircraft.iter().find(|a| a.hex == hex)
    }
}
