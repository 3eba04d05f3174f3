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

//! Expected payload shapes for every inbound event.
//!
//! Message and aircraft arrays are kept as raw [`Value`]s so that one bad
//! element is dropped on its own instead of failing the whole batch.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::RawMessage;
use crate::timeseries::DataPoint;

/// Event names used on the channel.
pub mod names {
    pub const CONNECT: &str = "connect";
    pub const DISCONNECT: &str = "disconnect";
    pub const RECONNECT: &str = "reconnect";

    pub const MESSAGE: &str = "message";
    pub const MESSAGE_BATCH: &str = "message_batch";
    pub const ALERT_MESSAGE: &str = "alert_message";
    pub const ALERT_MESSAGE_BATCH: &str = "alert_message_batch";
    pub const LABELS_CONFIG: &str = "labels_config";
    pub const ALERT_TERMS_CONFIG: &str = "alert_terms_config";
    pub const DECODER_FEATURES: &str = "decoder_features";
    pub const SYSTEM_STATUS: &str = "system_status";
    pub const VERSION_INFO: &str = "version_info";
    pub const STORAGE_SIZE: &str = "storage_size";
    pub const AIRCRAFT_STATUS: &str = "aircraft_status";
    pub const AIRCRAFT_SNAPSHOT: &str = "aircraft_snapshot";
    pub const SIGNAL_LEVELS: &str = "signal_levels";
    pub const ALERT_TERM_COUNTS: &str = "alert_term_counts";
    pub const STATION_IDS: &str = "station_ids";
    pub const FREQUENCY_DISTRIBUTION: &str = "frequency_distribution";
    pub const MESSAGE_TYPE_COUNTS: &str = "message_type_counts";
    pub const TIME_SERIES_PUSH: &str = "time_series_push";

    pub const REQUEST_TIME_SERIES: &str = "request_time_series";
    pub const REQUEST_SIGNAL_GRAPHS: &str = "request_signal_graphs";
    pub const REQUEST_FREQUENCIES: &str = "request_frequencies";
    pub const REQUEST_COUNTS: &str = "request_counts";
    pub const UPDATE_ALERT_TERMS: &str = "update_alert_terms";
}

/// Synthesized by the transport when the channel drops.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Disconnect {
    #[serde(default)]
    pub reason: String,
}

/// Synthesized by the transport when a connection is re-established.
#[derive(Debug, Clone, Deserialize)]
pub struct Reconnect {
    pub attempt: u32,
}

/// A single live (or alert) message, wrapped the way the server sends it.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageEnvelope {
    pub msghtml: RawMessage,
    #[serde(default)]
    pub loading: Option<bool>,
    #[serde(default)]
    pub done_loading: Option<bool>,
}

/// A batch of messages, typically recent history sent right after connect.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageBatch {
    pub messages: Vec<Value>,
    #[serde(default)]
    pub loading: Option<bool>,
    #[serde(default)]
    pub done_loading: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelInfo {
    pub name: String,
}

/// ACARS label code to human-readable description.
#[derive(Debug, Clone, Deserialize)]
pub struct LabelsConfig {
    pub labels: BTreeMap<String, LabelInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertTermsConfig {
    #[serde(default)]
    pub terms: Vec<String>,
    #[serde(default)]
    pub ignore: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdsbFeature {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub range_rings: bool,
}

/// Which decoders the server has enabled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderFeatures {
    pub acars: bool,
    pub vdlm: bool,
    pub hfdl: bool,
    pub imsl: bool,
    pub irdm: bool,
    pub adsb: AdsbFeature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentStatus {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Health of the decoders and feeders behind the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemStatus {
    pub error_state: bool,
    pub decoders: BTreeMap<String, ComponentStatus>,
    pub servers: BTreeMap<String, ComponentStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub container_version: String,
    #[serde(default)]
    pub github_version: Option<String>,
    #[serde(default)]
    pub is_outdated: bool,
}

/// Size of the server's message database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSize {
    pub size: u64,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AircraftStatus {
    pub adsb_enabled: bool,
    pub adsb_getting_data: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AircraftSnapshotPush {
    pub now: f64,
    #[serde(default)]
    pub aircraft: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalLevel {
    pub level: f64,
    pub count: u64,
}

/// Signal level histogram per decoder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalLevels {
    #[serde(default)]
    pub levels: BTreeMap<String, Vec<SignalLevel>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertTermCount {
    pub term: String,
    pub count: u64,
    #[serde(default)]
    pub id: u64,
}

/// Server-side per-term alert statistics, keyed by an index string.
#[derive(Debug, Clone, Deserialize)]
pub struct AlertTermCounts {
    pub data: BTreeMap<String, AlertTermCount>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StationIds {
    pub station_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyCount {
    pub freq_type: String,
    pub freq: String,
    pub count: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrequencyDistribution {
    pub freqs: Vec<FrequencyCount>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageCounts {
    pub non_empty_total: u64,
    pub non_empty_errors: u64,
    pub empty_total: u64,
    pub empty_errors: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageTypeCounts {
    pub count: MessageCounts,
}

/// Server push of one window's aggregate series.
///
/// An error push may carry nothing but `time_period` and `error`.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeSeriesPush {
    pub time_period: String,
    #[serde(default)]
    pub data: Vec<DataPoint>,
    #[serde(default)]
    pub start: i64,
    #[serde(default)]
    pub end: i64,
    #[serde(default)]
    pub points: usize,
    #[serde(default)]
    pub error: Option<String>,
}
