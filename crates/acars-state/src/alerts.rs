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

//! Alert term matching and notification gating.
//!
//! Matching is a case-insensitive substring search of every configured term
//! against four fields independently: free text, flight, tail and ICAO hex.
//! A term listed in the ignore set never contributes a match.

use std::collections::{BTreeSet, HashSet, VecDeque};

use log::debug;
use serde::Serialize;

use crate::message::{CanonicalMessage, IdentityKey};

/// How many notified message ids are remembered for re-notification checks.
const NOTIFIED_HISTORY: usize = 4096;

/// Undrained notifications kept; older ones are dropped first.
pub const MAX_PENDING_NOTIFICATIONS: usize = 256;

/// Configured alert and ignore terms, stored uppercased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertTermSet {
    terms: BTreeSet<String>,
    ignore: BTreeSet<String>,
}

fn normalize_terms<I, S>(terms: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    terms
        .into_iter()
        .map(|t| t.as_ref().trim().to_uppercase())
        .filter(|t| !t.is_empty())
        .collect()
}

impl AlertTermSet {
    #[must_use]
    pub fn new<I, J, S, T>(terms: I, ignore: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        Self {
            terms: normalize_terms(terms),
            ignore: normalize_terms(ignore),
        }
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(String::as_str)
    }

    pub fn ignored(&self) -> impl Iterator<Item = &str> {
        self.ignore.iter().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Terms that are allowed to produce matches.
    fn active_terms(&self) -> impl Iterator<Item = &str> {
        self.terms
            .iter()
            .filter(|t| !self.ignore.contains(*t))
            .map(String::as_str)
    }
}

/// Result of matching one message against the alert terms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlertMatch {
    pub matched: bool,
    pub matched_text: Vec<String>,
    pub matched_flight: Vec<String>,
    pub matched_tail: Vec<String>,
    pub matched_icao: Vec<String>,
}

impl AlertMatch {
    /// Build from server-side annotations carried on a raw message.
    #[must_use]
    pub fn from_annotations(
        matched: Option<bool>,
        text: Vec<String>,
        flight: Vec<String>,
        tail: Vec<String>,
        icao: Vec<String>,
    ) -> Self {
        let mut result = Self {
            matched: false,
            matched_text: text,
            matched_flight: flight,
            matched_tail: tail,
            matched_icao: icao,
        };
        result.matched = result.has_terms() || matched.unwrap_or(false);
        result
    }

    fn has_terms(&self) -> bool {
        !(self.matched_text.is_empty()
            && self.matched_flight.is_empty()
            && self.matched_tail.is_empty()
            && self.matched_icao.is_empty())
    }

    /// Merge two results, keeping each term once per field.
    #[must_use]
    pub fn union(mut self, other: AlertMatch) -> Self {
        fn extend(into: &mut Vec<String>, from: Vec<String>) {
            for term in from {
                if !into.contains(&term) {
                    into.push(term);
                }
            }
        }
        extend(&mut self.matched_text, other.matched_text);
        extend(&mut self.matched_flight, other.matched_flight);
        extend(&mut self.matched_tail, other.matched_tail);
        extend(&mut self.matched_icao, other.matched_icao);
        self.matched = self.matched || other.matched || self.has_terms();
        self
    }

    /// Every matched term, de-duplicated across fields.
    #[must_use]
    pub fn all_terms(&self) -> Vec<String> {
        let set: BTreeSet<&String> = self
            .matched_text
            .iter()
            .chain(&self.matched_flight)
            .chain(&self.matched_tail)
            .chain(&self.matched_icao)
            .collect();
        set.into_iter().cloned().collect()
    }
}

/// Pure matcher of messages against an [`AlertTermSet`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertMatcher;

impl AlertMatcher {
    #[must_use]
    pub fn match_message(message: &CanonicalMessage, terms: &AlertTermSet) -> AlertMatch {
        let text = message.payload_text().to_uppercase();
        let fields = [
            Some(text.as_str()),
            message.identity.flight.as_deref(),
            message.identity.tail.as_deref(),
            message.identity.hex.as_deref(),
        ];

        let mut lists: [Vec<String>; 4] = Default::default();
        for term in terms.active_terms() {
            for (field, list) in fields.iter().zip(lists.iter_mut()) {
                if field.is_some_and(|value| value.contains(term)) {
                    list.push(term.to_string());
                }
            }
        }

        let [matched_text, matched_flight, matched_tail, matched_icao] = lists;
        let mut result = AlertMatch {
            matched: false,
            matched_text,
            matched_flight,
            matched_tail,
            matched_icao,
        };
        result.matched = result.has_terms();
        result
    }
}

/// A transient on-screen and/or audible alert for one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertNotification {
    pub uid: String,
    pub group: IdentityKey,
    pub terms: Vec<String>,
    pub toast: bool,
    pub sound: bool,
}

/// Ensures each message id is counted and notified at most once.
#[derive(Debug, Default)]
pub struct NotificationGate {
    notified: HashSet<String>,
    order: VecDeque<String>,
    pending: VecDeque<AlertNotification>,
}

impl NotificationGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fresh match.
    ///
    /// Returns `false` if this message id was already notified once; nothing
    /// is counted or queued in that case.
    pub fn record(
        &mut self,
        uid: &str,
        group: &IdentityKey,
        terms: Vec<String>,
        toast: bool,
        sound: bool,
    ) -> bool {
        if !self.notified.insert(uid.to_string()) {
            return false;
        }
        self.order.push_back(uid.to_string());
        while self.order.len() > NOTIFIED_HISTORY {
            if let Some(old) = self.order.pop_front() {
                self.notified.remove(&old);
            }
        }

        if toast || sound {
            self.pending.push_back(AlertNotification {
                uid: uid.to_string(),
                group: group.clone(),
                terms,
                toast,
                sound,
            });
            while self.pending.len() > MAX_PENDING_NOTIFICATIONS {
                if let Some(dropped) = self.pending.pop_front() {
                    debug!("Notification queue full, dropped {}", dropped.uid);
                }
            }
        }
        true
    }

    /// Drain queued notifications for display.
    pub fn take_pending(&mut self) -> Vec<AlertNotification> {
        self.pending.drain(..).collect()
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
