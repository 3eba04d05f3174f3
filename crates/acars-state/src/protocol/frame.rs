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

//! Newline-delimited JSON framing.
//!
//! Each line on the channel carries one frame:
//! ```text
//! {"event": "<name>", "namespace": "/main", "data": <payload>}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ParseError, Protocol};

/// Namespace used when a frame doesn't name one.
pub const DEFAULT_NAMESPACE: &str = "/main";

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

/// A named event received from the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundFrame {
    /// Event name used to route the payload to its handler.
    pub event: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Untyped payload, narrowed later by the handler.
    #[serde(default)]
    pub data: Value,
}

/// A fire-and-forget command sent to the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundFrame {
    pub event: String,
    pub namespace: String,
    pub data: Value,
}

impl OutboundFrame {
    /// Encode the frame as a single line, newline included.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Parser for newline-delimited JSON frames.
#[derive(Debug, Default)]
pub struct EventParser;

impl EventParser {
    /// Create a new frame parser.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Protocol for EventParser {
    type Message = InboundFrame;
    type Error = ParseError;

    fn parse(&mut self, input: &[u8]) -> Result<Option<InboundFrame>, ParseError> {
        let line = std::str::from_utf8(input)
            .map_err(|e| ParseError::InvalidFormat(format!("invalid UTF-8: {e}")))?;

        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let frame: InboundFrame =
            serde_json::from_str(line).map_err(|e| ParseError::InvalidFormat(e.to_string()))?;

        if frame.event.is_empty() {
            return Err(ParseError::MissingField("event"));
        }

        Ok(Some(frame))
    }
}
