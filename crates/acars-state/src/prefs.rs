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

//! User preferences, their JSON export format and timestamp formatting.
//!
//! Preferences are read once at startup to size the group stores and gate
//! alert notifications. Imports are validated in full before anything is
//! applied.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::groups::GroupCaps;

/// Version written into every export.
pub const PREFS_EXPORT_VERSION: u32 = 1;

const MESSAGES_PER_AIRCRAFT_RANGE: (u32, u32) = (1, 500);
const GROUPS_RANGE: (u32, u32) = (1, 1000);

/// Errors raised when importing preferences.
#[derive(Debug, Error)]
pub enum PrefsError {
    #[error("invalid preferences file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported preferences version {0}")]
    UnsupportedVersion(u32),

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeFormat {
    #[serde(rename = "12h")]
    TwelveHour,
    #[default]
    #[serde(rename = "24h")]
    TwentyFourHour,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateFormat {
    /// 2025-03-14
    #[default]
    Ymd,
    /// 03/14/2025
    Mdy,
    /// 14/03/2025
    Dmy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimezoneChoice {
    #[default]
    Local,
    Utc,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

/// Persisted user preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Preferences {
    pub time_format: TimeFormat,
    pub date_format: DateFormat,
    pub timezone: TimezoneChoice,
    pub theme: Theme,
    /// Messages kept per aircraft group.
    pub max_messages_per_aircraft: u32,
    /// Groups kept in the live feed.
    pub max_message_groups: u32,
    /// Groups kept in the alerts feed.
    pub max_alert_groups: u32,
    /// Play a sound for new alert matches.
    pub alert_sound: bool,
    /// Show an on-screen notification for new alert matches.
    pub alert_toast: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            time_format: TimeFormat::default(),
            date_format: DateFormat::default(),
            timezone: TimezoneChoice::default(),
            theme: Theme::default(),
            max_messages_per_aircraft: 50,
            max_message_groups: 100,
            max_alert_groups: 200,
            alert_sound: false,
            alert_toast: true,
        }
    }
}

fn check_range(field: &'static str, value: u32, (min, max): (u32, u32)) -> Result<(), PrefsError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(PrefsError::OutOfRange { field, value, min, max })
    }
}

impl Preferences {
    pub fn validate(&self) -> Result<(), PrefsError> {
        check_range(
            "max_messages_per_aircraft",
            self.max_messages_per_aircraft,
            MESSAGES_PER_AIRCRAFT_RANGE,
        )?;
        check_range("max_message_groups", self.max_message_groups, GROUPS_RANGE)?;
        check_range("max_alert_groups", self.max_alert_groups, GROUPS_RANGE)?;
        Ok(())
    }

    /// Caps for the live message feed.
    #[must_use]
    pub fn group_caps(&self) -> GroupCaps {
        GroupCaps {
            max_messages_per_group: self.max_messages_per_aircraft as usize,
            max_groups: self.max_message_groups as usize,
        }
    }

    /// Caps for the alerts feed.
    #[must_use]
    pub fn alert_group_caps(&self) -> GroupCaps {
        GroupCaps {
            max_messages_per_group: self.max_messages_per_aircraft as usize,
            max_groups: self.max_alert_groups as usize,
        }
    }
}

/// On-disk shape of an exported preferences file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PreferencesExport {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub preferences: Preferences,
}

/// Serialize preferences for export.
pub fn export_json(prefs: &Preferences) -> Result<String, PrefsError> {
    let export = PreferencesExport {
        version: PREFS_EXPORT_VERSION,
        exported_at: Utc::now(),
        preferences: prefs.clone(),
    };
    Ok(serde_json::to_string_pretty(&export)?)
}

/// Parse and validate an exported preferences file.
///
/// Nothing is returned unless the whole payload is well formed.
pub fn import_json(json: &str) -> Result<Preferences, PrefsError> {
    let export: PreferencesExport = serde_json::from_str(json)?;
    if export.version == 0 || export.version > PREFS_EXPORT_VERSION {
        return Err(PrefsError::UnsupportedVersion(export.version));
    }
    export.preferences.validate()?;
    Ok(export.preferences)
}

/// Format a message timestamp (seconds since the epoch) for display.
#[must_use]
pub fn format_timestamp(timestamp: f64, prefs: &Preferences) -> Option<String> {
    if !timestamp.is_finite() {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, reason = "millisecond timestamps fit in i64")]
    let millis = (timestamp * 1000.0).round() as i64;
    let utc = DateTime::<Utc>::from_timestamp_millis(millis)?;

    let date = match prefs.date_format {
        DateFormat::Ymd => "%Y-%m-%d",
        DateFormat::Mdy => "%m/%d/%Y",
        DateFormat::Dmy => "%d/%m/%Y",
    };
    let time = match prefs.time_format {
        TimeFormat::TwelveHour => "%I:%M:%S %p",
        TimeFormat::TwentyFourHour => "%H:%M:%S",
    };
    let pattern = format!("{date} {time}");

    Some(match prefs.timezone {
        TimezoneChoice::Utc => format!("{} UTC", utc.format(&pattern)),
        TimezoneChoice::Local => utc.with_timezone(&Local).format(&pattern).to_string(),
    })
}
