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

//! Per-window cache of server-pushed message statistics.
//!
//! The server pushes one series per time window on its own schedule. Each
//! push replaces the cached entry for exactly one window, and the range of an
//! entry always travels with its points. A chart reading window A can
//! therefore never see range data that was written for window B.
//!
//! Before a chart is handed an entry, [`TimeSeriesCache::render`] checks the
//! entry's span against the window's nominal span; an implausible entry is
//! reported as still loading.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::events::TimeSeriesPush;

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Errors raised when a push cannot be stored.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("unknown time window '{0}'")]
    UnknownWindow(String),

    #[error("entry for window '{entry}' cannot be stored under '{key}'")]
    WindowMismatch { key: WindowKey, entry: WindowKey },

    #[error("server reported an error for '{window}': {message}")]
    Server { window: String, message: String },
}

/// The eight fixed time windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WindowKey {
    #[serde(rename = "1hr")]
    OneHour,
    #[serde(rename = "6hr")]
    SixHours,
    #[serde(rename = "12hr")]
    TwelveHours,
    #[serde(rename = "24hr")]
    OneDay,
    #[serde(rename = "1wk")]
    OneWeek,
    #[serde(rename = "30day")]
    ThirtyDays,
    #[serde(rename = "6mon")]
    SixMonths,
    #[serde(rename = "1yr")]
    OneYear,
}

/// Axis granularity a chart uses for a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl TimeUnit {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }
}

impl WindowKey {
    /// Every window, shortest first. This is also the warm-up request order.
    pub const ALL: [WindowKey; 8] = [
        Self::OneHour,
        Self::SixHours,
        Self::TwelveHours,
        Self::OneDay,
        Self::OneWeek,
        Self::ThirtyDays,
        Self::SixMonths,
        Self::OneYear,
    ];

    /// Wire identifier of this window.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneHour => "1hr",
            Self::SixHours => "6hr",
            Self::TwelveHours => "12hr",
            Self::OneDay => "24hr",
            Self::OneWeek => "1wk",
            Self::ThirtyDays => "30day",
            Self::SixMonths => "6mon",
            Self::OneYear => "1yr",
        }
    }

    /// Expected end minus start of a full series, in milliseconds.
    #[must_use]
    pub fn nominal_span_ms(self) -> i64 {
        match self {
            Self::OneHour => HOUR_MS,
            Self::SixHours => 6 * HOUR_MS,
            Self::TwelveHours => 12 * HOUR_MS,
            Self::OneDay => DAY_MS,
            Self::OneWeek => 7 * DAY_MS,
            Self::ThirtyDays => 30 * DAY_MS,
            Self::SixMonths => 182 * DAY_MS,
            Self::OneYear => 365 * DAY_MS,
        }
    }

    #[must_use]
    pub fn time_unit(self) -> TimeUnit {
        match self {
            Self::OneHour => TimeUnit::Minute,
            Self::SixHours | Self::TwelveHours | Self::OneDay => TimeUnit::Hour,
            Self::OneWeek | Self::ThirtyDays => TimeUnit::Day,
            Self::SixMonths => TimeUnit::Week,
            Self::OneYear => TimeUnit::Month,
        }
    }

    /// Width of one data point, in milliseconds.
    #[must_use]
    pub fn bucket_ms(self) -> i64 {
        match self {
            Self::OneHour => MINUTE_MS,
            Self::SixHours | Self::TwelveHours | Self::OneDay => 5 * MINUTE_MS,
            Self::OneWeek | Self::ThirtyDays => HOUR_MS,
            Self::SixMonths | Self::OneYear => 6 * HOUR_MS,
        }
    }

    /// Y-axis label matching [`Self::bucket_ms`].
    #[must_use]
    pub fn bucket_label(self) -> &'static str {
        match self {
            Self::OneHour => "Messages per minute",
            Self::SixHours | Self::TwelveHours | Self::OneDay => "Messages per 5 minutes",
            Self::OneWeek | Self::ThirtyDays => "Messages per hour",
            Self::SixMonths | Self::OneYear => "Messages per 6 hours",
        }
    }
}

impl fmt::Display for WindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WindowKey {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| CacheError::UnknownWindow(s.to_string()))
    }
}

/// One fixed-width bucket of message counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataPoint {
    /// Bucket start, milliseconds since the epoch.
    pub timestamp: i64,
    pub acars: u64,
    pub vdlm: u64,
    pub hfdl: u64,
    pub imsl: u64,
    pub irdm: u64,
    pub total: u64,
    pub error: u64,
}

/// A complete series for one window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeSeriesEntry {
    pub window: WindowKey,
    pub points: Vec<DataPoint>,
    pub start_ms: i64,
    pub end_ms: i64,
    pub point_count: usize,
}

impl TimeSeriesEntry {
    /// Validate a push and turn it into an entry.
    pub fn from_push(push: TimeSeriesPush) -> Result<Self, CacheError> {
        if let Some(message) = push.error {
            return Err(CacheError::Server {
                window: push.time_period,
                message,
            });
        }
        let window = push.time_period.parse()?;
        Ok(Self {
            window,
            point_count: if push.points == 0 { push.data.len() } else { push.points },
            points: push.data,
            start_ms: push.start,
            end_ms: push.end,
        })
    }

    #[must_use]
    pub fn span_ms(&self) -> i64 {
        self.end_ms.saturating_sub(self.start_ms)
    }

    /// Whether a chart with this window's time unit can safely draw the entry.
    #[must_use]
    pub fn is_renderable(&self) -> bool {
        self.end_ms >= self.start_ms && self.span_ms() <= 2 * self.window.nominal_span_ms()
    }
}

/// Result of a cache read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookup<'a> {
    Loading,
    Ready(&'a TimeSeriesEntry),
}

impl CacheLookup<'_> {
    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }
}

/// Everything a chart needs for one window, validated together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChartData<'a> {
    pub window: WindowKey,
    pub unit: TimeUnit,
    pub bucket_label: &'static str,
    pub start_ms: i64,
    pub end_ms: i64,
    pub points: &'a [DataPoint],
}

/// Entries keyed by window; at most one per key, never evicted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeSeriesCache {
    entries: BTreeMap<WindowKey, TimeSeriesEntry>,
}

impl TimeSeriesCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: WindowKey) -> CacheLookup<'_> {
        self.entries
            .get(&key)
            .map_or(CacheLookup::Loading, CacheLookup::Ready)
    }

    /// Replace the entry for `key`. The entry must belong to that window.
    pub fn set(&mut self, key: WindowKey, entry: TimeSeriesEntry) -> Result<(), CacheError> {
        if entry.window != key {
            return Err(CacheError::WindowMismatch {
                key,
                entry: entry.window,
            });
        }
        self.entries.insert(key, entry);
        Ok(())
    }

    /// Chart data for `key`, or `None` while the window is not renderable.
    #[must_use]
    pub fn render(&self, key: WindowKey) -> Option<ChartData<'_>> {
        match self.get(key) {
            CacheLookup::Ready(entry) if entry.is_renderable() => Some(ChartData {
                window: key,
                unit: key.time_unit(),
                bucket_label: key.bucket_label(),
                start_ms: entry.start_ms,
                end_ms: entry.end_ms,
                points: &entry.points,
            }),
            _ => None,
        }
    }

    /// Windows with a cached entry.
    pub fn populated(&self) -> impl Iterator<Item = WindowKey> + '_ {
        self.entries.keys().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: i64 = 1_700_000_000_000;

    fn entry(window: WindowKey, start: i64, end: i64) -> TimeSeriesEntry {
        TimeSeriesEntry {
            window,
            points: vec![DataPoint { timestamp: start, acars: 3, total: 3, ..Default::default() }],
            start_ms: start,
            end_ms: end,
            point_count: 1,
        }
    }

    #[test]
    fn test_window_tables_total() {
        for key in WindowKey::ALL {
            assert_eq!(key.as_str().parse::<WindowKey>().unwrap(), key);
            assert!(key.bucket_ms() > 0);
            assert!(!key.bucket_label().is_empty());
            assert!(key.nominal_span_ms() >= key.bucket_ms());
        }
        assert_eq!(WindowKey::OneHour.time_unit(), TimeUnit::Minute);
        assert_eq!(WindowKey::OneYear.time_unit(), TimeUnit::Month);
    }

    #[test]
    fn test_unknown_window_rejected() {
        assert_eq!(
            "2hr".parse::<WindowKey>(),
            Err(CacheError::UnknownWindow("2hr".to_string()))
        );
    }

    #[test]
    fn test_push_for_one_hour_is_isolated() {
        let mut cache = TimeSeriesCache::new();
        let push = TimeSeriesPush {
            time_period: "1hr".to_string(),
            data: vec![DataPoint::default(); 60],
            start: T - HOUR_MS,
            end: T,
            points: 60,
            error: None,
        };
        let entry = TimeSeriesEntry::from_push(push).unwrap();
        cache.set(entry.window, entry).unwrap();

        let chart = cache.render(WindowKey::OneHour).unwrap();
        assert_eq!((chart.start_ms, chart.end_ms), (T - HOUR_MS, T));
        assert_eq!(chart.points.len(), 60);
        assert!(!cache.get(WindowKey::OneHour).is_loading());
        assert!(cache.get(WindowKey::SixHours).is_loading());
    }

    #[test]
    fn test_other_window_push_leaves_entry_untouched() {
        let mut cache = TimeSeriesCache::new();
        cache.set(WindowKey::OneHour, entry(WindowKey::OneHour, T - HOUR_MS, T)).unwrap();
        let before = cache.get(WindowKey::OneHour);
        let before = match before {
            CacheLookup::Ready(e) => e.clone(),
            CacheLookup::Loading => panic!("expected entry"),
        };

        cache
            .set(WindowKey::OneYear, entry(WindowKey::OneYear, T - 365 * DAY_MS, T))
            .unwrap();

        assert_eq!(cache.get(WindowKey::OneHour), CacheLookup::Ready(&before));
    }

    #[test]
    fn test_mismatched_key_rejected() {
        let mut cache = TimeSeriesCache::new();
        let err = cache
            .set(WindowKey::OneHour, entry(WindowKey::OneYear, T - HOUR_MS, T))
            .unwrap_err();
        assert!(matches!(err, CacheError::WindowMismatch { .. }));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_stale_span_treated_as_loading() {
        let mut cache = TimeSeriesCache::new();
        cache
            .set(WindowKey::SixHours, entry(WindowKey::SixHours, T - 13 * HOUR_MS, T))
            .unwrap();

        assert!(!cache.get(WindowKey::SixHours).is_loading());
        assert!(cache.render(WindowKey::SixHours).is_none());
    }

    #[test]
    fn test_inverted_range_treated_as_loading() {
        let mut cache = TimeSeriesCache::new();
        cache.set(WindowKey::OneDay, entry(WindowKey::OneDay, T, T - HOUR_MS)).unwrap();
        assert!(cache.render(WindowKey::OneDay).is_none());
    }

    #[test]
    fn test_push_replaces_entry() {
        let mut cache = TimeSeriesCache::new();
        cache.set(WindowKey::OneHour, entry(WindowKey::OneHour, T - 2 * HOUR_MS, T - HOUR_MS)).unwrap();
        cache.set(WindowKey::OneHour, entry(WindowKey::OneHour, T - HOUR_MS, T)).unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.render(WindowKey::OneHour).unwrap().start_ms, T - HOUR_MS);
    }

    #[test]
    fn test_error_push_is_not_an_entry() {
        let push = TimeSeriesPush {
            time_period: "1hr".to_string(),
            data: vec![],
            start: 0,
            end: 0,
            points: 0,
            error: Some("rrd unavailable".to_string()),
        };
        assert!(matches!(
            TimeSeriesEntry::from_push(push),
            Err(CacheError::Server { .. })
        ));
    }
}
