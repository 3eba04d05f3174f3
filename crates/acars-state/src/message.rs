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

//! Decoded message records.
//!
//! [`RawMessage`] is the wire shape, every field optional. [`CanonicalMessage`]
//! is what the rest of the crate works with: validated, identity fields
//! normalized, and multipart payloads merged by part index.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::alerts::AlertMatch;

/// Errors for messages that cannot enter the pipeline.
#[derive(Debug, Error, PartialEq)]
pub enum MessageError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(f64),
}

/// Decoder that produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    #[serde(rename = "ACARS")]
    Acars,
    #[serde(rename = "VDL-M2", alias = "VDLM")]
    Vdlm,
    #[serde(rename = "HFDL")]
    Hfdl,
    #[serde(rename = "IMSL")]
    Imsl,
    #[serde(rename = "IRDM")]
    Irdm,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acars => write!(f, "ACARS"),
            Self::Vdlm => write!(f, "VDL-M2"),
            Self::Hfdl => write!(f, "HFDL"),
            Self::Imsl => write!(f, "IMSL"),
            Self::Irdm => write!(f, "IRDM"),
        }
    }
}

/// Accept the ICAO address either as the integer the database stores or as
/// a hex string.
fn de_icao<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Some(Value::String(s)) => u32::from_str_radix(s.trim(), 16).ok(),
        _ => None,
    })
}

/// An incoming decoded transmission, as received.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawMessage {
    pub uid: Option<String>,
    /// Seconds since the epoch.
    pub timestamp: Option<f64>,
    pub station_id: Option<String>,
    pub tail: Option<String>,
    pub flight: Option<String>,
    pub icao_hex: Option<String>,
    #[serde(deserialize_with = "de_icao")]
    pub icao: Option<u32>,
    pub text: Option<String>,
    pub data: Option<String>,
    pub decoded_text: Option<String>,
    pub label: Option<String>,
    pub msgno: Option<String>,
    pub freq: Option<f64>,
    pub level: Option<f64>,
    pub message_type: Option<MessageKind>,
    pub matched: Option<bool>,
    pub matched_text: Vec<String>,
    pub matched_flight: Vec<String>,
    pub matched_tail: Vec<String>,
    pub matched_icao: Vec<String>,
}

/// Which identity field a key was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IdentityKind {
    Hex,
    Tail,
    Flight,
    Station,
}

/// Key bucketing messages into a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityKey {
    pub kind: IdentityKind,
    pub value: String,
}

impl IdentityKey {
    #[must_use]
    pub fn new(kind: IdentityKind, value: &str) -> Self {
        Self {
            kind,
            value: normalize_identity(value).unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn hex(value: &str) -> Self {
        Self::new(IdentityKind::Hex, value)
    }

    #[must_use]
    pub fn tail(value: &str) -> Self {
        Self::new(IdentityKind::Tail, value)
    }

    #[must_use]
    pub fn flight(value: &str) -> Self {
        Self::new(IdentityKind::Flight, value)
    }

    #[must_use]
    pub fn station(value: &str) -> Self {
        Self::new(IdentityKind::Station, value)
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Trim and uppercase an identity field; blank becomes `None`.
#[must_use]
pub fn normalize_identity(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}

/// Normalized identity fields of one aircraft.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub hex: Option<String>,
    pub tail: Option<String>,
    pub flight: Option<String>,
}

impl Identity {
    /// Group key, preferring hex, then tail, then flight.
    #[must_use]
    pub fn group_key(&self) -> Option<IdentityKey> {
        if let Some(hex) = &self.hex {
            return Some(IdentityKey { kind: IdentityKind::Hex, value: hex.clone() });
        }
        if let Some(tail) = &self.tail {
            return Some(IdentityKey { kind: IdentityKind::Tail, value: tail.clone() });
        }
        self.flight
            .as_ref()
            .map(|flight| IdentityKey { kind: IdentityKind::Flight, value: flight.clone() })
    }

    /// All present identity fields as keys.
    #[must_use]
    pub fn keys(&self) -> Vec<IdentityKey> {
        [
            (IdentityKind::Hex, &self.hex),
            (IdentityKind::Tail, &self.tail),
            (IdentityKind::Flight, &self.flight),
        ]
        .into_iter()
        .filter_map(|(kind, value)| {
            value.as_ref().map(|v| IdentityKey { kind, value: v.clone() })
        })
        .collect()
    }
}

/// Multipart sequence marker derived from an ACARS message number.
///
/// Message numbers look like `M01A`, `M02A`, ...: the first and last
/// characters name the series, the two digits in between are the part.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PartMarker {
    pub series: String,
    pub index: u32,
}

impl PartMarker {
    #[must_use]
    pub fn parse(msgno: &str) -> Option<Self> {
        let chars: Vec<char> = msgno.trim().chars().collect();
        if chars.len() != 4 {
            return None;
        }
        if !chars[0].is_ascii_alphabetic()
            || !chars[1].is_ascii_digit()
            || !chars[2].is_ascii_digit()
            || !chars[3].is_ascii_alphanumeric()
        {
            return None;
        }
        let index = chars[1].to_digit(10)? * 10 + chars[2].to_digit(10)?;
        Some(Self {
            series: format!("{}{}", chars[0], chars[3]).to_uppercase(),
            index,
        })
    }
}

/// Payload carried by one part of a multipart message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PartPayload {
    pub text: Option<String>,
    pub data: Option<String>,
}

/// The de-duplicated, multipart-merged representation of one transmission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalMessage {
    pub uid: String,
    pub timestamp: f64,
    pub station_id: Option<String>,
    pub identity: Identity,
    pub label: Option<String>,
    pub msgno: Option<String>,
    pub freq: Option<f64>,
    pub level: Option<f64>,
    pub message_type: Option<MessageKind>,
    pub text: Option<String>,
    pub data: Option<String>,
    pub decoded_text: Option<String>,
    pub part_marker: Option<PartMarker>,
    /// How many redeliveries were folded into this record.
    pub duplicates: u32,
    /// Timestamp of the most recent delivery (original, duplicate or part).
    pub last_seen: f64,
    pub alert: AlertMatch,
    parts: BTreeMap<u32, PartPayload>,
}

impl TryFrom<RawMessage> for CanonicalMessage {
    type Error = MessageError;

    fn try_from(raw: RawMessage) -> Result<Self, Self::Error> {
        let uid = raw
            .uid
            .as_deref()
            .map(str::trim)
            .filter(|uid| !uid.is_empty())
            .map(str::to_string)
            .ok_or(MessageError::MissingField("uid"))?;
        let timestamp = raw.timestamp.ok_or(MessageError::MissingField("timestamp"))?;
        if !timestamp.is_finite() || timestamp < 0.0 {
            return Err(MessageError::InvalidTimestamp(timestamp));
        }

        let hex = raw
            .icao_hex
            .as_deref()
            .and_then(normalize_identity)
            .or_else(|| raw.icao.map(|icao| format!("{icao:06X}")));

        let identity = Identity {
            hex,
            tail: raw.tail.as_deref().and_then(normalize_identity),
            flight: raw.flight.as_deref().and_then(normalize_identity),
        };

        let part_marker = raw.msgno.as_deref().and_then(PartMarker::parse);
        let mut parts = BTreeMap::new();
        if let Some(marker) = &part_marker {
            parts.insert(
                marker.index,
                PartPayload { text: raw.text.clone(), data: raw.data.clone() },
            );
        }

        let alert = AlertMatch::from_annotations(
            raw.matched,
            raw.matched_text,
            raw.matched_flight,
            raw.matched_tail,
            raw.matched_icao,
        );

        Ok(Self {
            uid,
            timestamp,
            station_id: raw.station_id.as_deref().and_then(normalize_identity),
            identity,
            label: raw.label.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()),
            msgno: raw.msgno,
            freq: raw.freq,
            level: raw.level,
            message_type: raw.message_type,
            text: raw.text,
            data: raw.data,
            decoded_text: raw.decoded_text,
            part_marker,
            duplicates: 0,
            last_seen: timestamp,
            alert,
            parts,
        })
    }
}

impl CanonicalMessage {
    /// Group key for this message, falling back to the station id so that a
    /// message without any aircraft identity is still kept.
    #[must_use]
    pub fn group_key(&self) -> Option<IdentityKey> {
        self.identity.group_key().or_else(|| {
            self.station_id
                .as_ref()
                .map(|station| IdentityKey { kind: IdentityKind::Station, value: station.clone() })
        })
    }

    /// Part indices received so far; empty for single-part messages.
    #[must_use]
    pub fn parts_seen(&self) -> Vec<u32> {
        self.parts.keys().copied().collect()
    }

    #[must_use]
    pub fn has_part(&self, index: u32) -> bool {
        self.parts.contains_key(&index)
    }

    /// Fold another part into this message at its indicated position.
    ///
    /// Returns `false` if that part was already present.
    pub fn merge_part(&mut self, other: CanonicalMessage) -> bool {
        let Some(marker) = other.part_marker else {
            return false;
        };
        if self.parts.contains_key(&marker.index) {
            return false;
        }

        self.parts.insert(marker.index, PartPayload { text: other.text, data: other.data });
        self.text = join_parts(self.parts.values().map(|p| p.text.as_deref()));
        self.data = join_parts(self.parts.values().map(|p| p.data.as_deref()));
        self.last_seen = self.last_seen.max(other.timestamp);
        self.alert = std::mem::take(&mut self.alert).union(other.alert);
        true
    }

    /// Record a redelivery of this message.
    pub fn record_duplicate(&mut self, seen_at: f64) {
        self.duplicates += 1;
        self.last_seen = self.last_seen.max(seen_at);
    }

    /// Concatenated free-text payload used for duplicate keys and matching.
    #[must_use]
    pub fn payload_text(&self) -> String {
        [self.text.as_deref(), self.data.as_deref(), self.decoded_text.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn join_parts<'a>(parts: impl Iterator<Item = Option<&'a str>>) -> Option<String> {
    let joined: String = parts.flatten().collect();
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}
