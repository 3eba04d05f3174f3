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

//! Bounded per-aircraft message groups.
//!
//! The store maps an identity key to a [`MessageGroup`] holding that
//! aircraft's messages newest-first. Two caps keep memory bounded:
//! - per group: the oldest message is dropped from the tail once the group
//!   holds more than `max_messages_per_group`
//! - total: once there are more than `max_groups` groups, the group with the
//!   oldest last-updated timestamp is removed whole
//!
//! There is no time-based sweep. A quiet group lives until it is the least
//! recently updated one when room is needed, or until a cap is lowered.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use log::debug;
use serde::Serialize;

use crate::alerts::AlertMatch;
use crate::message::{CanonicalMessage, IdentityKey, IdentityKind};
use crate::reconciler::{MessageReconciler, Reconciliation};

/// Memory bounds for a [`GroupStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupCaps {
    pub max_messages_per_group: usize,
    pub max_groups: usize,
}

impl Default for GroupCaps {
    fn default() -> Self {
        Self {
            max_messages_per_group: 50,
            max_groups: 100,
        }
    }
}

/// Every identity value seen on a group's messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupIdentities {
    pub hexes: BTreeSet<String>,
    pub tails: BTreeSet<String>,
    pub flights: BTreeSet<String>,
}

impl GroupIdentities {
    fn from_messages<'a, I>(messages: I) -> Self
    where
        I: IntoIterator<Item = &'a CanonicalMessage>,
    {
        let mut identities = Self::default();
        for message in messages {
            identities.record(message);
        }
        identities
    }

    fn record(&mut self, message: &CanonicalMessage) {
        if let Some(hex) = &message.identity.hex {
            self.hexes.insert(hex.clone());
        }
        if let Some(tail) = &message.identity.tail {
            self.tails.insert(tail.clone());
        }
        if let Some(flight) = &message.identity.flight {
            self.flights.insert(flight.clone());
        }
    }

    fn keys(&self) -> impl Iterator<Item = IdentityKey> + '_ {
        let hexes = self.hexes.iter().map(|v| (IdentityKind::Hex, v));
        let tails = self.tails.iter().map(|v| (IdentityKind::Tail, v));
        let flights = self.flights.iter().map(|v| (IdentityKind::Flight, v));
        hexes
            .chain(tails)
            .chain(flights)
            .map(|(kind, value)| IdentityKey { kind, value: value.clone() })
    }
}

/// All retained messages for one aircraft identity.
#[derive(Debug, Clone, Serialize)]
pub struct MessageGroup {
    pub key: IdentityKey,
    /// Newest first.
    pub messages: VecDeque<CanonicalMessage>,
    pub identities: GroupIdentities,
    pub has_alerts: bool,
    /// Number of retained messages that matched an alert term.
    pub alert_count: usize,
    /// Latest timestamp of any message that touched this group (seconds).
    pub last_updated: f64,
    #[serde(skip)]
    recency: RecencyKey,
}

impl MessageGroup {
    fn new(key: IdentityKey) -> Self {
        Self {
            key,
            messages: VecDeque::new(),
            identities: GroupIdentities::default(),
            has_alerts: false,
            alert_count: 0,
            last_updated: 0.0,
            recency: (i64::MIN, 0),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[must_use]
    pub fn newest(&self) -> Option<&CanonicalMessage> {
        self.messages.front()
    }

    #[must_use]
    pub fn message(&self, uid: &str) -> Option<&CanonicalMessage> {
        self.messages.iter().find(|m| m.uid == uid)
    }

    fn message_mut(&mut self, uid: &str) -> Option<&mut CanonicalMessage> {
        self.messages.iter_mut().find(|m| m.uid == uid)
    }

    fn refresh_alert_flags(&mut self) {
        self.alert_count = self.messages.iter().filter(|m| m.alert.matched).count();
        self.has_alerts = self.alert_count > 0;
    }
}

/// Ordering key for least-recently-updated eviction: last-updated time in
/// milliseconds, ties broken by touch order.
type RecencyKey = (i64, u64);

#[allow(clippy::cast_possible_truncation, reason = "millisecond timestamps fit in i64")]
fn millis(seconds: f64) -> i64 {
    (seconds * 1000.0).round() as i64
}

/// What [`GroupStore::add_message`] did with a message.
#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    /// Stored as a new entry at the head of its group.
    Inserted {
        key: IdentityKey,
        uid: String,
        evicted: Option<IdentityKey>,
    },
    /// Folded into an existing entry as a redelivery.
    Duplicate { key: IdentityKey, uid: String },
    /// Merged into an existing multipart entry.
    Merged { key: IdentityKey, uid: String },
    /// The message carried no identity and no station; nothing stored.
    Unkeyed,
}

/// Bounded mapping from identity key to message group.
#[derive(Debug)]
pub struct GroupStore {
    caps: GroupCaps,
    reconciler: MessageReconciler,
    groups: HashMap<IdentityKey, MessageGroup>,
    recency: BTreeMap<RecencyKey, IdentityKey>,
    /// Identity value to every group whose retained messages carry it.
    index: HashMap<IdentityKey, BTreeSet<IdentityKey>>,
    touch_seq: u64,
}

impl GroupStore {
    #[must_use]
    pub fn new(caps: GroupCaps, reconciler: MessageReconciler) -> Self {
        Self {
            caps: sanitize(caps),
            reconciler,
            groups: HashMap::new(),
            recency: BTreeMap::new(),
            index: HashMap::new(),
            touch_seq: 0,
        }
    }

    #[must_use]
    pub fn caps(&self) -> GroupCaps {
        self.caps
    }

    #[must_use]
    pub fn reconciler(&self) -> &MessageReconciler {
        &self.reconciler
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of retained messages across all groups.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.groups.values().map(MessageGroup::len).sum()
    }

    #[must_use]
    pub fn get_group(&self, key: &IdentityKey) -> Option<&MessageGroup> {
        self.groups.get(key)
    }

    /// Find a group for the given identity value.
    ///
    /// A group keyed by exactly that identity wins. Otherwise the most
    /// recently updated group whose retained messages carry the value is
    /// returned.
    #[must_use]
    pub fn find_by_identity(&self, kind: IdentityKind, value: &str) -> Option<&MessageGroup> {
        let wanted = IdentityKey::new(kind, value);
        if wanted.value.is_empty() {
            return None;
        }
        if let Some(group) = self.groups.get(&wanted) {
            return Some(group);
        }
        self.index
            .get(&wanted)?
            .iter()
            .filter_map(|key| self.groups.get(key))
            .max_by_key(|group| group.recency)
    }

    /// Groups ordered from most to least recently updated.
    pub fn groups_by_recency(&self) -> impl Iterator<Item = &MessageGroup> {
        self.recency.values().rev().filter_map(|key| self.groups.get(key))
    }

    /// Add a canonical message, reconciling it against its group first.
    pub fn add_message(&mut self, message: CanonicalMessage) -> AddOutcome {
        let Some(key) = message.group_key() else {
            return AddOutcome::Unkeyed;
        };
        let timestamp = message.timestamp;

        let decision = match self.groups.get(&key) {
            Some(group) => self.reconciler.reconcile(message, &group.messages),
            None => Reconciliation::New(message),
        };

        match decision {
            Reconciliation::New(message) => {
                let uid = message.uid.clone();
                self.insert(&key, message);
                let evicted = self.enforce_group_limit();
                AddOutcome::Inserted { key, uid, evicted }
            }
            Reconciliation::Duplicate { existing_uid, seen_at } => {
                if let Some(existing) = self
                    .groups
                    .get_mut(&key)
                    .and_then(|g| g.message_mut(&existing_uid))
                {
                    existing.record_duplicate(seen_at);
                    debug!("Duplicate of {} for {} (count {})", existing_uid, key, existing.duplicates);
                }
                self.touch(&key, timestamp);
                AddOutcome::Duplicate { key, uid: existing_uid }
            }
            Reconciliation::Continuation { existing_uid, part } => {
                let identity_holder = part.clone();
                if let Some(group) = self.groups.get_mut(&key) {
                    if let Some(existing) = group.message_mut(&existing_uid) {
                        existing.merge_part(part);
                    }
                    group.identities.record(&identity_holder);
                    group.refresh_alert_flags();
                }
                for id in identity_holder.identity.keys() {
                    self.index_one(id, &key);
                }
                self.touch(&key, timestamp);
                AddOutcome::Merged { key, uid: existing_uid }
            }
        }
    }

    /// Replace the alert result on a stored message.
    ///
    /// Returns `true` when the message went from unmatched to matched.
    pub fn set_alert(&mut self, key: &IdentityKey, uid: &str, alert: AlertMatch) -> bool {
        let Some(group) = self.groups.get_mut(key) else {
            return false;
        };
        let Some(message) = group.message_mut(uid) else {
            return false;
        };
        let was_matched = message.alert.matched;
        message.alert = alert;
        let now_matched = message.alert.matched;
        group.refresh_alert_flags();
        !was_matched && now_matched
    }

    /// Change the caps, trimming groups and evicting as needed.
    pub fn set_caps(&mut self, caps: GroupCaps) {
        self.caps = sanitize(caps);
        let per_group = self.caps.max_messages_per_group;
        let mut trimmed = Vec::new();
        for group in self.groups.values_mut() {
            if group.messages.len() > per_group {
                group.messages.truncate(per_group);
                group.refresh_alert_flags();
                trimmed.push(group.key.clone());
            }
        }
        for key in &trimmed {
            self.reindex(key);
        }
        while self.enforce_group_limit().is_some() {}
    }

    /// Drop every group.
    pub fn clear(&mut self) {
        self.groups.clear();
        self.recency.clear();
        self.index.clear();
    }

    fn insert(&mut self, key: &IdentityKey, message: CanonicalMessage) {
        let timestamp = message.timestamp;
        let per_group = self.caps.max_messages_per_group;

        let group = self
            .groups
            .entry(key.clone())
            .or_insert_with(|| MessageGroup::new(key.clone()));
        group.identities.record(&message);
        let identity_holder = message.identity.clone();
        group.messages.push_front(message);
        let mut trimmed = false;
        if group.messages.len() > per_group {
            if let Some(dropped) = group.messages.pop_back() {
                debug!("Group {} over cap, dropped {}", key, dropped.uid);
                trimmed = true;
            }
        }
        group.refresh_alert_flags();

        if trimmed {
            self.reindex(key);
        } else {
            for id in identity_holder.keys() {
                self.index_one(id, key);
            }
        }
        self.touch(key, timestamp);
    }

    fn index_one(&mut self, id: IdentityKey, key: &IdentityKey) {
        self.index.entry(id).or_default().insert(key.clone());
    }

    fn unindex(&mut self, id: &IdentityKey, key: &IdentityKey) {
        if let Some(owners) = self.index.get_mut(id) {
            owners.remove(key);
            if owners.is_empty() {
                self.index.remove(id);
            }
        }
    }

    /// Rebuild a group's identities from its retained messages after a trim.
    fn reindex(&mut self, key: &IdentityKey) {
        let Some(group) = self.groups.get_mut(key) else {
            return;
        };
        let stale: Vec<IdentityKey> = group.identities.keys().collect();
        group.identities = GroupIdentities::from_messages(&group.messages);
        let fresh: Vec<IdentityKey> = group.identities.keys().collect();

        for id in &stale {
            self.unindex(id, key);
        }
        for id in fresh {
            self.index_one(id, key);
        }
    }

    fn touch(&mut self, key: &IdentityKey, timestamp: f64) {
        let Some(group) = self.groups.get_mut(key) else {
            return;
        };
        self.recency.remove(&group.recency);
        self.touch_seq += 1;
        group.last_updated = group.last_updated.max(timestamp);
        group.recency = (millis(group.last_updated), self.touch_seq);
        self.recency.insert(group.recency, key.clone());
    }

    /// Evict the least recently updated group if over the group cap.
    fn enforce_group_limit(&mut self) -> Option<IdentityKey> {
        if self.groups.len() <= self.caps.max_groups {
            return None;
        }
        let (_, key) = self.recency.pop_first()?;
        let group = self.groups.remove(&key)?;
        for id in group.identities.keys() {
            self.unindex(&id, &key);
        }
        debug!("Evicted group {} ({} messages)", key, group.messages.len());
        Some(key)
    }
}

fn sanitize(caps: GroupCaps) -> GroupCaps {
    GroupCaps {
        max_messages_per_group: caps.max_messages_per_group.max(1),
        max_groups: caps.max_groups.max(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::RawMessage;
    use crate::reconciler::ReconcilerConfig;

    fn message(uid: &str, ts: f64, flight: &str, text: &str) -> CanonicalMessage {
        CanonicalMessage::try_from(RawMessage {
            uid: Some(uid.to_string()),
            timestamp: Some(ts),
            flight: Some(flight.to_string()),
            text: Some(text.to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    fn store(per_group: usize, groups: usize) -> GroupStore {
        GroupStore::new(
            GroupCaps { max_messages_per_group: per_group, max_groups: groups },
            MessageReconciler::default(),
        )
    }

    fn uids(group: &MessageGroup) -> Vec<&str> {
        group.messages.iter().map(|m| m.uid.as_str()).collect()
    }

    #[test]
    fn test_per_group_cap_keeps_newest() {
        let mut store = store(2, 10);
        store.add_message(message("m1", 1.0, "UAL123", "ONE"));
        store.add_message(message("m2", 2.0, "UAL123", "TWO"));
        store.add_message(message("m3", 3.0, "UAL123", "THREE"));

        let group = store.get_group(&IdentityKey::flight("UAL123")).unwrap();
        assert_eq!(uids(group), vec!["m3", "m2"]);
    }

    #[test]
    fn test_per_group_cap_many_messages() {
        let mut store = store(5, 10);
        for i in 0..40 {
            store.add_message(message(&format!("m{i}"), f64::from(i), "UAL123", &format!("TEXT {i}")));
        }
        store.add_message(message("x1", 1.0, "DAL1", "OTHER"));

        let group = store.get_group(&IdentityKey::flight("UAL123")).unwrap();
        assert_eq!(uids(group), vec!["m39", "m38", "m37", "m36", "m35"]);
        assert_eq!(store.get_group(&IdentityKey::flight("DAL1")).unwrap().len(), 1);
    }

    #[test]
    fn test_total_cap_evicts_oldest_updated() {
        let mut store = store(5, 3);
        store.add_message(message("a1", 10.0, "AAA1", "A"));
        store.add_message(message("b1", 20.0, "BBB1", "B"));
        store.add_message(message("c1", 30.0, "CCC1", "C"));
        // A becomes the most recently updated group.
        store.add_message(message("a2", 40.0, "AAA1", "A2"));

        let outcome = store.add_message(message("d1", 50.0, "DDD1", "D"));
        assert!(matches!(
            outcome,
            AddOutcome::Inserted { evicted: Some(ref key), .. } if *key == IdentityKey::flight("BBB1")
        ));
        assert_eq!(store.len(), 3);
        assert!(store.get_group(&IdentityKey::flight("BBB1")).is_none());
        assert!(store.get_group(&IdentityKey::flight("AAA1")).is_some());
        assert!(store.find_by_identity(IdentityKind::Flight, "BBB1").is_none());
    }

    #[test]
    fn test_total_cap_holds_exactly_max() {
        let mut store = store(2, 4);
        for i in 0..20 {
            store.add_message(message(&format!("m{i}"), f64::from(i), &format!("FL{i}"), "X"));
        }
        assert_eq!(store.len(), 4);
        let remaining: Vec<&str> = store.groups_by_recency().map(|g| g.key.value.as_str()).collect();
        assert_eq!(remaining, vec!["FL19", "FL18", "FL17", "FL16"]);
    }

    #[test]
    fn test_duplicate_increments_counter() {
        let mut store = GroupStore::new(
            GroupCaps::default(),
            MessageReconciler::new(ReconcilerConfig {
                duplicate_window_secs: 120.0,
                ..Default::default()
            }),
        );
        let mut m1 = RawMessage {
            uid: Some("m1".to_string()),
            timestamp: Some(100.0),
            flight: Some("UAL123".to_string()),
            tail: Some("N1".to_string()),
            text: Some("POSITION".to_string()),
            ..Default::default()
        };
        store.add_message(CanonicalMessage::try_from(m1.clone()).unwrap());
        m1.uid = Some("m2".to_string());
        m1.timestamp = Some(160.0);
        let outcome = store.add_message(CanonicalMessage::try_from(m1).unwrap());

        assert!(matches!(outcome, AddOutcome::Duplicate { ref uid, .. } if uid == "m1"));
        assert_eq!(store.len(), 1);
        let group = store.get_group(&IdentityKey::tail("N1")).unwrap();
        assert_eq!(group.len(), 1);
        assert_eq!(group.messages[0].duplicates, 1);
        assert!((group.messages[0].last_seen - 160.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_multipart_merged_in_place() {
        let mut store = store(10, 10);
        let mut p1 = RawMessage {
            uid: Some("p1".to_string()),
            timestamp: Some(100.0),
            flight: Some("UAL123".to_string()),
            msgno: Some("M01A".to_string()),
            text: Some("PART ONE ".to_string()),
            ..Default::default()
        };
        store.add_message(CanonicalMessage::try_from(p1.clone()).unwrap());
        store.add_message(message("x", 101.0, "UAL123", "UNRELATED"));

        p1.uid = Some("p2".to_string());
        p1.timestamp = Some(102.0);
        p1.msgno = Some("M02A".to_string());
        p1.text = Some("PART TWO".to_string());
        let outcome = store.add_message(CanonicalMessage::try_from(p1).unwrap());

        assert!(matches!(outcome, AddOutcome::Merged { ref uid, .. } if uid == "p1"));
        let group = store.get_group(&IdentityKey::flight("UAL123")).unwrap();
        assert_eq!(uids(group), vec!["x", "p1"]);
        assert_eq!(group.messages[1].text.as_deref(), Some("PART ONE PART TWO"));
        assert_eq!(group.messages[1].parts_seen(), vec![1, 2]);
    }

    #[test]
    fn test_unkeyed_message() {
        let mut store = store(2, 2);
        let message = CanonicalMessage::try_from(RawMessage {
            uid: Some("m1".to_string()),
            timestamp: Some(1.0),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(store.add_message(message), AddOutcome::Unkeyed);
        assert!(store.is_empty());
    }

    #[test]
    fn test_identity_index() {
        let mut store = store(5, 5);
        let message = CanonicalMessage::try_from(RawMessage {
            uid: Some("m1".to_string()),
            timestamp: Some(1.0),
            icao_hex: Some("abc123".to_string()),
            flight: Some("UAL123".to_string()),
            tail: Some("N1".to_string()),
            ..Default::default()
        })
        .unwrap();
        store.add_message(message);

        let key = IdentityKey::hex("ABC123");
        assert_eq!(store.find_by_identity(IdentityKind::Flight, "ual123").map(|g| &g.key), Some(&key));
        assert_eq!(store.find_by_identity(IdentityKind::Tail, "N1").map(|g| &g.key), Some(&key));
        assert!(store.find_by_identity(IdentityKind::Tail, "").is_none());
    }

    fn tagged(uid: &str, ts: f64, hex: Option<&str>, flight: &str) -> CanonicalMessage {
        CanonicalMessage::try_from(RawMessage {
            uid: Some(uid.to_string()),
            timestamp: Some(ts),
            icao_hex: hex.map(str::to_string),
            flight: Some(flight.to_string()),
            text: Some(uid.to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_own_key_beats_shared_identity() {
        let mut store = store(5, 5);
        store.add_message(tagged("f1", 10.0, None, "UAL123"));
        store.add_message(tagged("h1", 1.0, Some("ABC123"), "UAL123"));

        let found = store.find_by_identity(IdentityKind::Flight, "UAL123").unwrap();
        assert_eq!(found.key, IdentityKey::flight("UAL123"));
    }

    #[test]
    fn test_identity_survives_eviction_of_other_group() {
        let mut store = store(5, 2);
        store.add_message(tagged("f1", 10.0, None, "UAL123"));
        store.add_message(tagged("h1", 1.0, Some("ABC123"), "UAL123"));
        store.add_message(tagged("x1", 20.0, None, "DAL1"));

        assert!(store.get_group(&IdentityKey::hex("ABC123")).is_none());
        let found = store.find_by_identity(IdentityKind::Flight, "UAL123").unwrap();
        assert_eq!(found.key, IdentityKey::flight("UAL123"));
        assert!(store.find_by_identity(IdentityKind::Hex, "ABC123").is_none());
    }

    #[test]
    fn test_shared_identity_prefers_recent_group() {
        let mut store = store(5, 5);
        store.add_message(tagged("a1", 1.0, Some("AAAAAA"), "UAL9"));
        store.add_message(tagged("b1", 2.0, Some("BBBBBB"), "UAL9"));

        let found = store.find_by_identity(IdentityKind::Flight, "UAL9").unwrap();
        assert_eq!(found.key, IdentityKey::hex("BBBBBB"));

        store.add_message(tagged("a2", 3.0, Some("AAAAAA"), "AAL1"));
        let found = store.find_by_identity(IdentityKind::Flight, "UAL9").unwrap();
        assert_eq!(found.key, IdentityKey::hex("AAAAAA"));
    }

    #[test]
    fn test_trimmed_identity_is_forgotten() {
        let mut store = store(2, 5);
        store.add_message(tagged("m1", 1.0, Some("ABC123"), "UAL1"));
        store.add_message(tagged("m2", 2.0, Some("ABC123"), "UAL2"));
        assert!(store.find_by_identity(IdentityKind::Flight, "UAL1").is_some());

        store.add_message(tagged("m3", 3.0, Some("ABC123"), "UAL2"));
        assert!(store.find_by_identity(IdentityKind::Flight, "UAL1").is_none());
        let group = store.get_group(&IdentityKey::hex("ABC123")).unwrap();
        assert!(!group.identities.flights.contains("UAL1"));
        assert!(store.find_by_identity(IdentityKind::Flight, "UAL2").is_some());
    }

    #[test]
    fn test_lowering_caps_reindexes() {
        let mut store = store(5, 5);
        store.add_message(tagged("m1", 1.0, Some("ABC123"), "UAL1"));
        store.add_message(tagged("m2", 2.0, Some("ABC123"), "UAL2"));
        store.add_message(tagged("d1", 3.0, None, "DAL1"));

        store.set_caps(GroupCaps { max_messages_per_group: 1, max_groups: 1 });

        assert!(store.find_by_identity(IdentityKind::Flight, "DAL1").is_some());
        assert!(store.find_by_identity(IdentityKind::Flight, "UAL1").is_none());
        assert!(store.find_by_identity(IdentityKind::Flight, "UAL2").is_none());
    }

    #[test]
    fn test_repeating_payload_starts_new_entry_after_window() {
        let mut store = store(50, 5);
        for i in 0..10 {
            let ts = 100.0 * f64::from(i + 1);
            store.add_message(message(&format!("m{i}"), ts, "UAL123", "POSITION REPORT"));
        }

        let group = store.get_group(&IdentityKey::flight("UAL123")).unwrap();
        // Every second copy lands within 120 s of the entry it folds into.
        assert_eq!(uids(group), vec!["m8", "m6", "m4", "m2", "m0"]);
        assert!(group.messages.iter().all(|m| m.duplicates == 1));
    }

    #[test]
    fn test_lowering_caps_trims() {
        let mut store = store(5, 5);
        for i in 0..5 {
            store.add_message(message(&format!("a{i}"), f64::from(i), "AAA", &format!("{i}")));
        }
        store.add_message(message("b0", 10.0, "BBB", "B"));
        store.add_message(message("c0", 11.0, "CCC", "C"));

        store.set_caps(GroupCaps { max_messages_per_group: 2, max_groups: 2 });

        assert_eq!(store.len(), 2);
        assert!(store.get_group(&IdentityKey::flight("AAA")).is_none());
        assert_eq!(store.message_count(), 2);
    }

    #[test]
    fn test_set_alert_transition() {
        let mut store = store(5, 5);
        store.add_message(message("m1", 1.0, "UAL1", "MAYDAY"));
        let key = IdentityKey::flight("UAL1");
        let hit = AlertMatch::from_annotations(None, vec!["MAYDAY".into()], vec![], vec![], vec![]);

        assert!(store.set_alert(&key, "m1", hit.clone()));
        assert!(!store.set_alert(&key, "m1", hit));
        let group = store.get_group(&key).unwrap();
        assert!(group.has_alerts);
        assert_eq!(group.alert_count, 1);
    }
}
