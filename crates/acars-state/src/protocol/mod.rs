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

//! Protocol layer for the dashboard event stream.
//!
//! The transport delivers named events whose payloads are untyped JSON. This
//! module frames them ([`EventParser`]), narrows each payload into an explicit
//! shape ([`events`]) before anything reaches the core, and builds the
//! outbound commands the core emits ([`OutboundCommand`]).

pub mod events;
mod frame;

pub use frame::{EventParser, InboundFrame, OutboundFrame, DEFAULT_NAMESPACE};

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;

use crate::timeseries::WindowKey;

/// Errors that can occur while decoding frames or event payloads.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid frame format: {0}")]
    InvalidFormat(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid payload for event '{event}': {reason}")]
    InvalidPayload { event: String, reason: String },
}

/// Trait for frame parsers.
///
/// Implement this trait to support another framing of the duplex channel.
pub trait Protocol {
    /// The frame type produced by this parser.
    type Message;
    /// The error type for parsing failures.
    type Error;

    /// Parse input bytes into a frame.
    ///
    /// Returns `Ok(Some(frame))` if parsing succeeded,
    /// `Ok(None)` if the input is valid but doesn't produce a frame (e.g. a
    /// keep-alive blank line), or `Err(error)` if parsing failed.
    fn parse(&mut self, input: &[u8]) -> Result<Option<Self::Message>, Self::Error>;
}

/// Narrow an untyped event payload into its expected shape.
pub fn decode<T: DeserializeOwned>(event: &str, data: &Value) -> Result<T, ParseError> {
    T::deserialize(data).map_err(|e| ParseError::InvalidPayload {
        event: event.to_string(),
        reason: e.to_string(),
    })
}

/// Commands the core emits towards the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCommand {
    /// Ask the server to push the aggregate series for one window.
    RequestTimeSeries(WindowKey),
    /// Ask for signal level graphs and alert term counts.
    RequestSignalGraphs,
    /// Ask for the frequency distribution.
    RequestFrequencies,
    /// Ask for message type counts.
    RequestCounts,
    /// Replace the server-side alert terms.
    UpdateAlertTerms { terms: Vec<String>, ignore: Vec<String> },
}

impl OutboundCommand {
    /// Wire event name of this command.
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::RequestTimeSeries(_) => events::names::REQUEST_TIME_SERIES,
            Self::RequestSignalGraphs => events::names::REQUEST_SIGNAL_GRAPHS,
            Self::RequestFrequencies => events::names::REQUEST_FREQUENCIES,
            Self::RequestCounts => events::names::REQUEST_COUNTS,
            Self::UpdateAlertTerms { .. } => events::names::UPDATE_ALERT_TERMS,
        }
    }

    /// JSON payload of this command.
    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::RequestTimeSeries(window) => json!({ "time_period": window.as_str() }),
            Self::RequestSignalGraphs | Self::RequestFrequencies | Self::RequestCounts => {
                json!({})
            }
            Self::UpdateAlertTerms { terms, ignore } => json!({ "terms": terms, "ignore": ignore }),
        }
    }

    /// Build the frame for this command in the given namespace.
    #[must_use]
    pub fn into_frame(self, namespace: &str) -> OutboundFrame {
        OutboundFrame {
            event: self.event_name().to_string(),
            namespace: namespace.to_string(),
            data: self.payload(),
        }
    }
}
