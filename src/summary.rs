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

//! Plain-text status summary of the live state.

use std::fmt::Write as _;

use acars_state::prefs::format_timestamp;
use acars_state::StateContainer;
use chrono::{DateTime, Utc};

/// Nearest paired aircraft to the receiving station, as (hex, flight, nm).
fn nearest_paired(state: &StateContainer) -> Option<(String, Option<String>, f64)> {
    let adsb = &state.system().features.adsb;
    let (lat, lon) = (adsb.lat?, adsb.lon?);
    let snapshot = state.snapshot();

    state
        .pairings()
        .into_iter()
        .filter(|(_, pairing)| pairing.is_some())
        .filter_map(|(hex, _)| {
            let position = snapshot.get_by_hex(&hex)?;
            let distance = position.distance_from_nm(lat, lon)?;
            Some((hex, position.flight.clone(), distance))
        })
        .min_by(|a, b| a.2.total_cmp(&b.2))
}

fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{hours}h {minutes}m {secs}s")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

/// Render a multi-line summary of `state` as of `now`.
pub fn render(state: &StateContainer, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let connection = state.connection();

    if connection.connected {
        let _ = writeln!(out, "Connection: connected");
    } else {
        let reason = connection.last_disconnect.as_deref().unwrap_or("not connected yet");
        let _ = writeln!(out, "Connection: disconnected ({reason})");
    }
    if connection.reconnect_attempts > 0 {
        let _ = writeln!(out, "Reconnects: {}", connection.reconnect_attempts);
    }

    let messages = state.messages();
    let _ = writeln!(
        out,
        "Messages: {} in {} groups",
        messages.message_count(),
        messages.len()
    );
    let _ = writeln!(
        out,
        "Alerts: {} unread, {} alert groups",
        state.alert_count(),
        state.alerts().len()
    );

    let paired = state.pairings().values().filter(|p| p.is_some()).count();
    let _ = writeln!(out, "Aircraft: {} tracked, {} paired", state.snapshot().len(), paired);
    if let Some((hex, flight, distance)) = nearest_paired(state) {
        let name = flight.unwrap_or(hex);
        let _ = writeln!(out, "Nearest paired: {name} at {distance:.1} nm");
    }

    let newest = messages
        .groups_by_recency()
        .next()
        .and_then(|group| group.newest())
        .map(|message| message.timestamp);
    if let Some(timestamp) = newest {
        let formatted = format_timestamp(timestamp, state.preferences())
            .unwrap_or_else(|| timestamp.to_string());
        #[allow(clippy::cast_possible_truncation, reason = "seconds since the epoch fit in i64")]
        let age = (now.timestamp() - timestamp.floor() as i64).max(0);
        let _ = writeln!(
            out,
            "Last message: {formatted} ({} ago)",
            format_duration(age.unsigned_abs())
        );
    }

    let windows: Vec<&str> = state.populated_windows().map(|w| w.as_str()).collect();
    if !windows.is_empty() {
        let _ = writeln!(out, "Charts: {}", windows.join(", "));
    }
    if let Some(error) = state.last_error() {
        let _ = writeln!(out, "Chart error: {error}");
    }

    out
}
