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

//! Duplicate and multipart reconciliation.
//!
//! Given one incoming message and the recent messages for the same identity,
//! decide whether it is new, a redelivery of something already stored, or
//! another part of a multipart message. Pure: no storage, no I/O.

use crate::message::CanonicalMessage;

/// Tunables for duplicate detection.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Two messages further apart than this are never reconciled.
    pub duplicate_window_secs: f64,
    /// How many characters of the payload take part in the duplicate key.
    pub payload_prefix_len: usize,
    /// Include the ACARS label in the duplicate key.
    pub key_label: bool,
    /// Include the receiving station in the duplicate key.
    pub key_station: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            duplicate_window_secs: 120.0,
            payload_prefix_len: 64,
            key_label: true,
            key_station: false,
        }
    }
}

/// Outcome of reconciling one message.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// Not related to anything stored; insert it.
    New(CanonicalMessage),
    /// A redelivery of the stored message `existing_uid`.
    Duplicate { existing_uid: String, seen_at: f64 },
    /// Another part of the stored multipart message `existing_uid`.
    Continuation { existing_uid: String, part: CanonicalMessage },
}

/// Decides how an incoming message relates to recent ones.
#[derive(Debug, Clone, Default)]
pub struct MessageReconciler {
    config: ReconcilerConfig,
}

impl MessageReconciler {
    #[must_use]
    pub fn new(config: ReconcilerConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Key two messages must share to count as the same transmission.
    #[must_use]
    pub fn duplicate_key(&self, message: &CanonicalMessage) -> String {
        let mut key = message
            .group_key()
            .map(|k| k.value)
            .unwrap_or_default();
        if self.config.key_label {
            key.push('|');
            key.push_str(message.label.as_deref().unwrap_or(""));
        }
        if self.config.key_station {
            key.push('|');
            key.push_str(message.station_id.as_deref().unwrap_or(""));
        }
        key.push('|');
        key.extend(message.payload_text().chars().take(self.config.payload_prefix_len));
        key
    }

    fn within_window(&self, a: f64, b: f64) -> bool {
        (a - b).abs() <= self.config.duplicate_window_secs
    }

    /// Reconcile `incoming` against the recent messages of its group.
    pub fn reconcile<'a, I>(&self, incoming: CanonicalMessage, recent: I) -> Reconciliation
    where
        I: IntoIterator<Item = &'a CanonicalMessage>,
    {
        let recent: Vec<&CanonicalMessage> = recent.into_iter().collect();

        // At-least-once delivery: the very same id again.
        if let Some(existing) = recent.iter().find(|m| m.uid == incoming.uid) {
            return Reconciliation::Duplicate {
                existing_uid: existing.uid.clone(),
                seen_at: incoming.timestamp,
            };
        }

        if let Some(marker) = &incoming.part_marker {
            let series = recent.iter().find(|m| {
                m.part_marker.as_ref().is_some_and(|p| p.series == marker.series)
                    && m.label == incoming.label
                    && m.station_id == incoming.station_id
                    && self.within_window(m.timestamp, incoming.timestamp)
            });
            if let Some(existing) = series {
                if existing.has_part(marker.index) {
                    return Reconciliation::Duplicate {
                        existing_uid: existing.uid.clone(),
                        seen_at: incoming.timestamp,
                    };
                }
                return Reconciliation::Continuation {
                    existing_uid: existing.uid.clone(),
                    part: incoming,
                };
            }
        }

        let key = self.duplicate_key(&incoming);
        let duplicate = recent.iter().find(|m| {
            self.within_window(m.timestamp, incoming.timestamp) && self.duplicate_key(m) == key
        });
        if let Some(existing) = duplicate {
            return Reconciliation::Duplicate {
                existing_uid: existing.uid.clone(),
                seen_at: incoming.timestamp,
            };
        }

        Reconciliation::New(incoming)
    }
}
