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

//! Aircraft-to-message-group pairing.
//!
//! Each aircraft in a snapshot is looked up by hex, then flight number, then
//! tail number. This differs from group keying (hex, tail, flight) on
//! purpose: in live ADS-B feeds the flight number is populated far more often
//! than the registration and is the more specific signal.
//!
//! Pairings borrow from their inputs and are recomputed on every call.

use std::collections::BTreeMap;

use crate::aircraft::{AircraftPosition, AircraftSnapshot};
use crate::groups::{GroupStore, MessageGroup};
use crate::message::IdentityKind;

/// Lookup order used when pairing.
pub const PAIRING_PRIORITY: [IdentityKind; 3] =
    [IdentityKind::Hex, IdentityKind::Flight, IdentityKind::Tail];

/// One aircraft matched to a message group.
#[derive(Debug, Clone, Copy)]
pub struct Pairing<'a> {
    pub group: &'a MessageGroup,
    /// Which identity field produced the match.
    pub matched_on: IdentityKind,
}

/// Aircraft hex to its paired group, or `None` when unpaired.
pub type Pairings<'a> = BTreeMap<String, Option<Pairing<'a>>>;

/// Pure pairing of snapshots against a [`GroupStore`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AircraftPairingEngine;

impl AircraftPairingEngine {
    /// Pair every aircraft in the snapshot.
    #[must_use]
    pub fn pair<'a>(snapshot: &AircraftSnapshot, groups: &'a GroupStore) -> Pairings<'a> {
        snapshot
            .aircraft
            .iter()
            .map(|aircraft| (aircraft.hex.clone(), Self::pair_one(aircraft, groups)))
            .collect()
    }

    /// Pair a single aircraft.
    #[must_use]
    pub fn pair_one<'a>(aircraft: &AircraftPosition, groups: &'a GroupStore) -> Option<Pairing<'a>> {
        PAIRING_PRIORITY.iter().find_map(|&kind| {
            let value = match kind {
                IdentityKind::Hex => Some(aircraft.hex.as_str()),
                IdentityKind::Flight => aircraft.flight.as_deref(),
                IdentityKind::Tail => aircraft.tail.as_deref(),
                IdentityKind::Station => None,
            }?;
            groups
                .find_by_identity(kind, value)
                .map(|group| Pairing { group, matched_on: kind })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::GroupCaps;
    use crate::message::{CanonicalMessage, IdentityKey, RawMessage};
    use crate::protocol::events::AircraftSnapshotPush;
    use crate::reconciler::MessageReconciler;
    use serde_json::json;

    fn add(store: &mut GroupStore, uid: &str, hex: Option<&str>, flight: Option<&str>, tail: Option<&str>) {
        add_at(store, uid, 1.0, hex, flight, tail);
    }

    fn add_at(
        store: &mut GroupStore,
        uid: &str,
        ts: f64,
        hex: Option<&str>,
        flight: Option<&str>,
        tail: Option<&str>,
    ) {
        store.add_message(
            CanonicalMessage::try_from(RawMessage {
                uid: Some(uid.to_string()),
                timestamp: Some(ts),
                icao_hex: hex.map(str::to_string),
                flight: flight.map(str::to_string),
                tail: tail.map(str::to_string),
                text: Some(uid.to_string()),
                ..Default::default()
            })
            .unwrap(),
        );
    }

    fn snapshot(aircraft: Vec<serde_json::Value>) -> AircraftSnapshot {
        AircraftSnapshot::from_push(AircraftSnapshotPush { now: 0.0, aircraft })
    }

    fn store() -> GroupStore {
        GroupStore::new(GroupCaps::default(), MessageReconciler::default())
    }

    #[test]
    fn test_hex_wins_over_flight() {
        let mut store = store();
        add(&mut store, "m1", Some("ABC123"), None, None);
        add(&mut store, "m2", None, Some("UAL123"), None);

        let snap = snapshot(vec![json!({ "hex": "abc123", "flight": "UAL123" })]);
        let pairings = AircraftPairingEngine::pair(&snap, &store);

        let pairing = pairings["ABC123"].unwrap();
        assert_eq!(pairing.group.key, IdentityKey::hex("ABC123"));
        assert_eq!(pairing.matched_on, IdentityKind::Hex);
    }

    #[test]
    fn test_flight_used_when_hex_unknown() {
        let mut store = store();
        add(&mut store, "m1", Some("ABC123"), None, None);
        add(&mut store, "m2", None, Some("UAL123"), None);

        let snap = snapshot(vec![json!({ "hex": "FFFFFF", "flight": "UAL123" })]);
        let pairings = AircraftPairingEngine::pair(&snap, &store);

        let pairing = pairings["FFFFFF"].unwrap();
        assert_eq!(pairing.group.key, IdentityKey::flight("UAL123"));
        assert_eq!(pairing.matched_on, IdentityKind::Flight);
    }

    #[test]
    fn test_flight_checked_before_tail() {
        let mut store = store();
        add(&mut store, "m1", None, None, Some("N1"));
        add(&mut store, "m2", None, Some("UAL9"), None);

        let snap = snapshot(vec![json!({ "hex": "FFFFFF", "flight": "UAL9", "r": "N1" })]);
        let pairings = AircraftPairingEngine::pair(&snap, &store);

        assert_eq!(pairings["FFFFFF"].unwrap().matched_on, IdentityKind::Flight);
    }

    #[test]
    fn test_tail_fallback_and_unpaired() {
        let mut store = store();
        add(&mut store, "m1", None, None, Some("N1"));

        let snap = snapshot(vec![
            json!({ "hex": "AAAAAA", "r": "N1" }),
            json!({ "hex": "BBBBBB", "flight": "NOPE" }),
        ]);
        let pairings = AircraftPairingEngine::pair(&snap, &store);

        assert_eq!(pairings["AAAAAA"].unwrap().matched_on, IdentityKind::Tail);
        assert!(pairings["BBBBBB"].is_none());
    }

    #[test]
    fn test_flight_seen_on_hex_keyed_group() {
        let mut store = store();
        add(&mut store, "m1", Some("ABC123"), Some("UAL123"), None);

        let snap = snapshot(vec![json!({ "hex": "000001", "flight": "UAL123" })]);
        let pairing = AircraftPairingEngine::pair(&snap, &store)["000001"].unwrap();

        assert_eq!(pairing.group.key, IdentityKey::hex("ABC123"));
        assert_eq!(pairing.matched_on, IdentityKind::Flight);
    }

    #[test]
    fn test_flight_keyed_group_beats_hex_group_carrying_flight() {
        let mut store = store();
        add_at(&mut store, "f1", 10.0, None, Some("UAL123"), None);
        add_at(&mut store, "h1", 1.0, Some("ABC123"), Some("UAL123"), None);

        let snap = snapshot(vec![json!({ "hex": "FFFFFF", "flight": "UAL123" })]);
        let pairing = AircraftPairingEngine::pair(&snap, &store)["FFFFFF"].unwrap();

        assert_eq!(pairing.group.key, IdentityKey::flight("UAL123"));
        assert_eq!(pairing.matched_on, IdentityKind::Flight);
    }

    #[test]
    fn test_pairing_after_sharing_group_evicted() {
        let mut store = GroupStore::new(
            GroupCaps { max_messages_per_group: 5, max_groups: 2 },
            MessageReconciler::default(),
        );
        add_at(&mut store, "f1", 10.0, None, Some("UAL123"), None);
        add_at(&mut store, "h1", 1.0, Some("ABC123"), Some("UAL123"), None);
        add_at(&mut store, "x1", 20.0, None, Some("DAL1"), None);
        assert!(store.get_group(&IdentityKey::hex("ABC123")).is_none());

        let snap = snapshot(vec![json!({ "hex": "FFFFFF", "flight": "UAL123" })]);
        let pairing = AircraftPairingEngine::pair(&snap, &store)["FFFFFF"].unwrap();

        assert_eq!(pairing.group.key, IdentityKey::flight("UAL123"));
    }
}
