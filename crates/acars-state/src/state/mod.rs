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

//! Reactive state container.
//!
//! [`StateContainer`] owns every piece of client state and is the only place
//! it is mutated. Each inbound event type has one entry point; an entry point
//! applies its change and then commits once, publishing a [`StateChange`]
//! that names the [`Slice`]s it touched. Readers watch the slices they render
//! and re-read through the accessors when notified.
//!
//! The container is driven from a single task (see
//! [`handlers::register_handlers`]), so it holds no locks.

mod handlers;
mod view;

pub use handlers::register_handlers;
pub use view::{paginate, FilterState, GroupView, Page};

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::aircraft::AircraftSnapshot;
use crate::alerts::{AlertMatcher, AlertNotification, AlertTermSet, NotificationGate};
use crate::groups::{AddOutcome, GroupStore};
use crate::message::{CanonicalMessage, IdentityKey, RawMessage};
use crate::pairing::{AircraftPairingEngine, Pairings};
use crate::prefs::{self, Preferences, PrefsError};
use crate::protocol::events::{
    AircraftSnapshotPush, AircraftStatus, AlertTermCount, AlertTermCounts, AlertTermsConfig,
    DecoderFeatures, FrequencyCount, FrequencyDistribution, LabelInfo, LabelsConfig,
    MessageBatch, MessageCounts, MessageEnvelope, MessageTypeCounts, SignalLevels, StationIds,
    StorageSize, SystemStatus, TimeSeriesPush, VersionInfo,
};
use crate::protocol::OutboundCommand;
use crate::reconciler::{MessageReconciler, ReconcilerConfig};
use crate::stream::Emitter;
use crate::timeseries::{CacheError, CacheLookup, ChartData, TimeSeriesCache, TimeSeriesEntry, WindowKey};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Independently observable parts of the state tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Slice {
    Connection,
    Messages,
    Alerts,
    AlertTerms,
    Notifications,
    Labels,
    Aircraft,
    TimeSeries,
    Statistics,
    System,
    History,
    Filters,
    Preferences,
}

/// One committed update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub revision: u64,
    pub slices: BTreeSet<Slice>,
}

impl StateChange {
    #[must_use]
    pub fn touches(&self, slice: Slice) -> bool {
        self.slices.contains(&slice)
    }
}

/// Receives only the changes that touch a chosen set of slices.
#[derive(Debug)]
pub struct SliceReceiver {
    rx: broadcast::Receiver<StateChange>,
    slices: BTreeSet<Slice>,
    lagged: bool,
}

impl SliceReceiver {
    fn accept(&mut self, change: StateChange) -> Option<StateChange> {
        if self.lagged {
            // Missed changes: report every watched slice as dirty.
            self.lagged = false;
            return Some(StateChange {
                revision: change.revision,
                slices: self.slices.clone(),
            });
        }
        let touched: BTreeSet<Slice> = change.slices.intersection(&self.slices).copied().collect();
        (!touched.is_empty()).then_some(StateChange {
            revision: change.revision,
            slices: touched,
        })
    }

    /// Wait for the next relevant change. `None` once the container is gone.
    pub async fn recv(&mut self) -> Option<StateChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) => {
                    if let Some(change) = self.accept(change) {
                        return Some(change);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("State watcher lagged by {} change(s)", missed);
                    self.lagged = true;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next relevant change if one is already queued.
    pub fn try_recv(&mut self) -> Option<StateChange> {
        loop {
            match self.rx.try_recv() {
                Ok(change) => {
                    if let Some(change) = self.accept(change) {
                        return Some(change);
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => self.lagged = true,
                Err(_) => return None,
            }
        }
    }
}

/// Transport status as seen by the UI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    /// Reason of the last disconnect; shown as a banner while disconnected.
    pub last_disconnect: Option<String>,
    pub reconnect_attempts: u32,
}

/// Progress of the recent-history replay sent after connect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HistoryState {
    pub loading: bool,
    pub done_loading: bool,
}

impl HistoryState {
    fn update(&mut self, loading: Option<bool>, done_loading: Option<bool>) -> bool {
        let before = *self;
        if let Some(loading) = loading {
            self.loading = loading;
        }
        if done_loading == Some(true) {
            self.done_loading = true;
            self.loading = false;
        }
        before != *self
    }
}

/// Server-pushed statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Statistics {
    pub signal_levels: SignalLevels,
    /// Sorted by term.
    pub alert_term_counts: Vec<AlertTermCount>,
    pub frequencies: Vec<FrequencyCount>,
    pub message_counts: Option<MessageCounts>,
    pub station_ids: Vec<String>,
}

/// Server configuration and health.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SystemInfo {
    pub features: DecoderFeatures,
    pub status: SystemStatus,
    pub version: Option<VersionInfo>,
    pub storage: Option<StorageSize>,
    pub aircraft_status: AircraftStatus,
}

/// The client state tree and its mutation surface.
pub struct StateContainer {
    prefs: Preferences,
    emitter: Option<Emitter>,
    mounted: bool,
    connection: ConnectionStatus,
    messages: GroupStore,
    alerts: GroupStore,
    alert_terms: AlertTermSet,
    alert_count: u64,
    gate: NotificationGate,
    labels: BTreeMap<String, LabelInfo>,
    snapshot: AircraftSnapshot,
    time_series: TimeSeriesCache,
    last_error: Option<String>,
    statistics: Statistics,
    system: SystemInfo,
    history: HistoryState,
    filters: FilterState,
    revision: u64,
    pending: BTreeSet<Slice>,
    change_tx: broadcast::Sender<StateChange>,
}

impl std::fmt::Debug for StateContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateContainer")
            .field("revision", &self.revision)
            .field("connection", &self.connection)
            .field("groups", &self.messages.len())
            .field("alert_groups", &self.alerts.len())
            .field("aircraft", &self.snapshot.len())
            .finish_non_exhaustive()
    }
}

impl Default for StateContainer {
    fn default() -> Self {
        Self::new(Preferences::default(), ReconcilerConfig::default())
    }
}

impl StateContainer {
    #[must_use]
    pub fn new(prefs: Preferences, reconciler: ReconcilerConfig) -> Self {
        let (change_tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let reconciler = MessageReconciler::new(reconciler);
        Self {
            messages: GroupStore::new(prefs.group_caps(), reconciler.clone()),
            alerts: GroupStore::new(prefs.alert_group_caps(), reconciler),
            prefs,
            emitter: None,
            mounted: false,
            connection: ConnectionStatus::default(),
            alert_terms: AlertTermSet::default(),
            alert_count: 0,
            gate: NotificationGate::new(),
            labels: BTreeMap::new(),
            snapshot: AircraftSnapshot::default(),
            time_series: TimeSeriesCache::new(),
            last_error: None,
            statistics: Statistics::default(),
            system: SystemInfo::default(),
            history: HistoryState::default(),
            filters: FilterState::default(),
            revision: 0,
            pending: BTreeSet::new(),
            change_tx,
        }
    }

    /// Give the container a way to send commands to the server.
    pub fn attach(&mut self, emitter: Emitter) {
        self.emitter = Some(emitter);
    }

    /// Subscribe to every committed change.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.change_tx.subscribe()
    }

    /// Subscribe to changes touching any of `slices`.
    #[must_use]
    pub fn watch<I: IntoIterator<Item = Slice>>(&self, slices: I) -> SliceReceiver {
        SliceReceiver {
            rx: self.change_tx.subscribe(),
            slices: slices.into_iter().collect(),
            lagged: false,
        }
    }

    fn mark(&mut self, slice: Slice) {
        self.pending.insert(slice);
    }

    /// Publish everything marked since the last commit as one change.
    fn commit(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        self.revision += 1;
        let change = StateChange {
            revision: self.revision,
            slices: std::mem::take(&mut self.pending),
        };
        // No watchers is fine.
        let _ = self.change_tx.send(change);
    }

    fn send(&self, command: OutboundCommand) -> bool {
        if !self.connection.connected {
            debug!("Not connected, dropping '{}'", command.event_name());
            return false;
        }
        match &self.emitter {
            Some(emitter) => emitter.send(command),
            None => {
                debug!("No emitter attached, dropping '{}'", command.event_name());
                false
            }
        }
    }

    /// Request every time-series window. Returns how many requests went out.
    fn warm_up(&self) -> usize {
        let sent = WindowKey::ALL
            .into_iter()
            .filter(|&window| self.send(OutboundCommand::RequestTimeSeries(window)))
            .count();
        if sent > 0 {
            debug!("Requested {} time series window(s)", sent);
        }
        sent
    }

    // ---- lifecycle -------------------------------------------------------

    /// Called once the consuming view is up. Issues the time-series warm-up
    /// if already connected; otherwise the next connect will.
    pub fn mount(&mut self) -> usize {
        self.mounted = true;
        self.warm_up()
    }

    pub fn on_connect(&mut self) {
        info!("Connected to server");
        self.connection.connected = true;
        self.connection.last_disconnect = None;
        self.mark(Slice::Connection);
        if self.mounted {
            self.warm_up();
        }
        self.commit();
    }

    /// Buffered state is kept across a disconnect.
    pub fn on_disconnect(&mut self, reason: &str) {
        warn!("Disconnected: {}", reason);
        self.connection.connected = false;
        self.connection.last_disconnect = Some(reason.to_string());
        self.mark(Slice::Connection);
        self.commit();
    }

    pub fn on_reconnect(&mut self, attempt: u32) {
        self.connection.reconnect_attempts = attempt;
        self.mark(Slice::Connection);
        self.commit();
    }

    // ---- messages --------------------------------------------------------

    pub fn on_message(&mut self, envelope: MessageEnvelope) {
        self.update_history(envelope.loading, envelope.done_loading);
        self.ingest_live(envelope.msghtml);
        self.commit();
    }

    /// Each element goes through the same path as [`Self::on_message`], in
    /// order; malformed elements are dropped individually.
    pub fn on_message_batch(&mut self, batch: MessageBatch) {
        self.update_history(batch.loading, batch.done_loading);
        for raw in decode_batch(batch.messages) {
            self.ingest_live(raw);
        }
        self.commit();
    }

    pub fn on_alert_message(&mut self, envelope: MessageEnvelope) {
        self.ingest_alert(envelope.msghtml);
        self.commit();
    }

    pub fn on_alert_message_batch(&mut self, batch: MessageBatch) {
        for raw in decode_batch(batch.messages) {
            self.ingest_alert(raw);
        }
        self.commit();
    }

    fn update_history(&mut self, loading: Option<bool>, done_loading: Option<bool>) {
        if self.history.update(loading, done_loading) {
            self.mark(Slice::History);
        }
    }

    fn canonicalize(&self, raw: RawMessage) -> Option<CanonicalMessage> {
        let mut message = match CanonicalMessage::try_from(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!("Rejected message: {}", e);
                return None;
            }
        };
        let local = AlertMatcher::match_message(&message, &self.alert_terms);
        message.alert = std::mem::take(&mut message.alert).union(local);
        Some(message)
    }

    fn ingest_live(&mut self, raw: RawMessage) {
        let Some(message) = self.canonicalize(raw) else {
            return;
        };

        match self.messages.add_message(message) {
            AddOutcome::Inserted { key, uid, evicted } => {
                if let Some(evicted) = evicted {
                    debug!("Evicted group {}", evicted);
                }
                self.mark(Slice::Messages);
                self.notify_if_matched(&key, &uid);
            }
            AddOutcome::Merged { key, uid } => {
                // The joined text may match where the parts alone did not.
                let rematch = self.messages.get_group(&key).and_then(|g| g.message(&uid)).map(|m| {
                    m.alert.clone().union(AlertMatcher::match_message(m, &self.alert_terms))
                });
                if let Some(alert) = rematch {
                    self.messages.set_alert(&key, &uid, alert);
                }
                self.mark(Slice::Messages);
                self.notify_if_matched(&key, &uid);
            }
            AddOutcome::Duplicate { .. } => self.mark(Slice::Messages),
            AddOutcome::Unkeyed => warn!("Dropping message without identity or station"),
        }
    }

    fn notify_if_matched(&mut self, key: &IdentityKey, uid: &str) {
        let Some(terms) = self
            .messages
            .get_group(key)
            .and_then(|g| g.message(uid))
            .filter(|m| m.alert.matched)
            .map(|m| m.alert.all_terms())
        else {
            return;
        };
        if self
            .gate
            .record(uid, key, terms, self.prefs.alert_toast, self.prefs.alert_sound)
        {
            self.alert_count += 1;
            self.mark(Slice::Notifications);
        }
    }

    fn ingest_alert(&mut self, raw: RawMessage) {
        let Some(message) = self.canonicalize(raw) else {
            return;
        };
        match self.alerts.add_message(message) {
            AddOutcome::Unkeyed => warn!("Dropping alert without identity or station"),
            _ => self.mark(Slice::Alerts),
        }
    }

    // ---- configuration pushes -------------------------------------------

    pub fn on_labels(&mut self, config: LabelsConfig) {
        self.labels = config.labels;
        self.mark(Slice::Labels);
        self.commit();
    }

    /// Replaces the term set. Stored messages are not re-evaluated.
    pub fn on_alert_terms(&mut self, config: AlertTermsConfig) {
        self.alert_terms = AlertTermSet::new(config.terms, config.ignore);
        self.mark(Slice::AlertTerms);
        self.commit();
    }

    pub fn on_decoder_features(&mut self, features: DecoderFeatures) {
        self.system.features = features;
        self.mark(Slice::System);
        self.commit();
    }

    pub fn on_system_status(&mut self, status: SystemStatus) {
        if status.error_state {
            warn!("Server reports a degraded decoder or feeder");
        }
        self.system.status = status;
        self.mark(Slice::System);
        self.commit();
    }

    pub fn on_version_info(&mut self, version: VersionInfo) {
        if version.is_outdated {
            info!(
                "Server {} is outdated (latest {})",
                version.container_version,
                version.github_version.as_deref().unwrap_or("unknown")
            );
        }
        self.system.version = Some(version);
        self.mark(Slice::System);
        self.commit();
    }

    pub fn on_storage_size(&mut self, storage: StorageSize) {
        self.system.storage = Some(storage);
        self.mark(Slice::System);
        self.commit();
    }

    pub fn on_aircraft_status(&mut self, status: AircraftStatus) {
        self.system.aircraft_status = status;
        self.mark(Slice::System);
        self.commit();
    }

    /// Replaces the previous snapshot whole.
    pub fn on_aircraft_snapshot(&mut self, push: AircraftSnapshotPush) {
        self.snapshot = AircraftSnapshot::from_push(push);
        self.mark(Slice::Aircraft);
        self.commit();
    }

    // ---- statistics -----------------------------------------------------

    pub fn on_signal_levels(&mut self, levels: SignalLevels) {
        self.statistics.signal_levels = levels;
        self.mark(Slice::Statistics);
        self.commit();
    }

    pub fn on_alert_term_counts(&mut self, counts: AlertTermCounts) {
        let mut counts: Vec<AlertTermCount> = counts.data.into_values().collect();
        counts.sort_by(|a, b| a.term.cmp(&b.term));
        self.statistics.alert_term_counts = counts;
        self.mark(Slice::Statistics);
        self.commit();
    }

    pub fn on_station_ids(&mut self, ids: StationIds) {
        self.statistics.station_ids = ids.station_ids;
        self.mark(Slice::Statistics);
        self.commit();
    }

    pub fn on_frequency_distribution(&mut self, distribution: FrequencyDistribution) {
        self.statistics.frequencies = distribution.freqs;
        self.mark(Slice::Statistics);
        self.commit();
    }

    pub fn on_message_type_counts(&mut self, counts: MessageTypeCounts) {
        self.statistics.message_counts = Some(counts.count);
        self.mark(Slice::Statistics);
        self.commit();
    }

    /// Store one window's series. Error pushes only set [`Self::last_error`];
    /// cached entries are never discarded by them.
    pub fn on_time_series(&mut self, push: TimeSeriesPush) {
        match TimeSeriesEntry::from_push(push) {
            Ok(entry) => match self.time_series.set(entry.window, entry) {
                Ok(()) => {
                    self.last_error = None;
                    self.mark(Slice::TimeSeries);
                }
                Err(e) => warn!("Discarding time series push: {}", e),
            },
            Err(CacheError::Server { window, message }) => {
                warn!("Time series error for '{}': {}", window, message);
                self.last_error = Some(message);
                self.mark(Slice::TimeSeries);
            }
            Err(e) => warn!("Discarding time series push: {}", e),
        }
        self.commit();
    }

    // ---- user actions ---------------------------------------------------

    /// Replace the alert terms locally and send them to the server.
    ///
    /// Returns whether the command was sent.
    pub fn update_alert_terms<I, J, S, T>(&mut self, terms: I, ignore: J) -> bool
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        self.alert_terms = AlertTermSet::new(terms, ignore);
        self.mark(Slice::AlertTerms);
        let sent = self.send(OutboundCommand::UpdateAlertTerms {
            terms: self.alert_terms.terms().map(str::to_string).collect(),
            ignore: self.alert_terms.ignored().map(str::to_string).collect(),
        });
        self.commit();
        sent
    }

    pub fn reset_alert_count(&mut self) {
        self.alert_count = 0;
        self.mark(Slice::Notifications);
        self.commit();
    }

    /// Drain notifications waiting to be shown.
    pub fn take_notifications(&mut self) -> Vec<AlertNotification> {
        self.gate.take_pending()
    }

    pub fn set_text_filter(&mut self, text: &str) {
        let text = text.trim();
        if self.filters.text != text {
            self.filters.text = text.to_string();
            self.mark(Slice::Filters);
        }
        self.commit();
    }

    pub fn set_label_exclusions<I, S>(&mut self, labels: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.filters.excluded_labels = labels
            .into_iter()
            .map(|l| l.as_ref().trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        self.mark(Slice::Filters);
        self.commit();
    }

    pub fn set_only_alerts(&mut self, only_alerts: bool) {
        if self.filters.only_alerts != only_alerts {
            self.filters.only_alerts = only_alerts;
            self.mark(Slice::Filters);
        }
        self.commit();
    }

    /// Apply new preferences. Lowered caps trim the stores immediately.
    ///
    /// Invalid preferences leave everything unchanged.
    pub fn apply_preferences(&mut self, prefs: Preferences) -> Result<(), PrefsError> {
        prefs.validate()?;
        if prefs.group_caps() != self.messages.caps() {
            self.messages.set_caps(prefs.group_caps());
            self.mark(Slice::Messages);
        }
        if prefs.alert_group_caps() != self.alerts.caps() {
            self.alerts.set_caps(prefs.alert_group_caps());
            self.mark(Slice::Alerts);
        }
        self.prefs = prefs;
        self.mark(Slice::Preferences);
        self.commit();
        Ok(())
    }

    pub fn import_preferences(&mut self, json: &str) -> Result<(), PrefsError> {
        let prefs = prefs::import_json(json)?;
        self.apply_preferences(prefs)
    }

    pub fn export_preferences(&self) -> Result<String, PrefsError> {
        prefs::export_json(&self.prefs)
    }

    // ---- reads ----------------------------------------------------------

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    #[must_use]
    pub fn connection(&self) -> &ConnectionStatus {
        &self.connection
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.connected
    }

    #[must_use]
    pub fn messages(&self) -> &GroupStore {
        &self.messages
    }

    #[must_use]
    pub fn alerts(&self) -> &GroupStore {
        &self.alerts
    }

    #[must_use]
    pub fn alert_terms(&self) -> &AlertTermSet {
        &self.alert_terms
    }

    /// Messages that newly matched an alert term since the last reset.
    #[must_use]
    pub fn alert_count(&self) -> u64 {
        self.alert_count
    }

    #[must_use]
    pub fn labels(&self) -> &BTreeMap<String, LabelInfo> {
        &self.labels
    }

    /// Human-readable name of an ACARS label.
    #[must_use]
    pub fn label_name(&self, label: &str) -> Option<&str> {
        self.labels.get(label).map(|info| info.name.as_str())
    }

    #[must_use]
    pub fn snapshot(&self) -> &AircraftSnapshot {
        &self.snapshot
    }

    /// Pair the current snapshot with the live message groups.
    #[must_use]
    pub fn pairings(&self) -> Pairings<'_> {
        AircraftPairingEngine::pair(&self.snapshot, &self.messages)
    }

    #[must_use]
    pub fn time_series(&self, window: WindowKey) -> CacheLookup<'_> {
        self.time_series.get(window)
    }

    /// Chart data for `window`, or `None` while it should render as loading.
    #[must_use]
    pub fn chart(&self, window: WindowKey) -> Option<ChartData<'_>> {
        self.time_series.render(window)
    }

    /// Windows whose series has arrived at least once.
    pub fn populated_windows(&self) -> impl Iterator<Item = WindowKey> + '_ {
        self.time_series.populated()
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    #[must_use]
    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    #[must_use]
    pub fn system(&self) -> &SystemInfo {
        &self.system
    }

    #[must_use]
    pub fn history(&self) -> HistoryState {
        self.history
    }

    #[must_use]
    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    #[must_use]
    pub fn preferences(&self) -> &Preferences {
        &self.prefs
    }

    /// A filtered page of the live feed.
    #[must_use]
    pub fn groups_page(&self, page: usize, page_size: usize) -> Page<'_> {
        paginate(self.messages.groups_by_recency(), &self.filters, page, page_size)
    }

    /// A page of the alerts feed. Only the label exclusions apply here.
    #[must_use]
    pub fn alert_groups_page(&self, page: usize, page_size: usize) -> Page<'_> {
        let filters = FilterState {
            excluded_labels: self.filters.excluded_labels.clone(),
            ..FilterState::default()
        };
        paginate(self.alerts.groups_by_recency(), &filters, page, page_size)
    }
}

fn decode_batch(messages: Vec<Value>) -> impl Iterator<Item = RawMessage> {
    messages
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<RawMessage>(value) {
            Ok(raw) => Some(raw),
            Err(e) => {
                warn!("Dropping malformed batch element: {}", e);
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::GroupCaps;
    use crate::message::IdentityKind;
    use crate::protocol::OutboundFrame;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn container() -> (StateContainer, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = StateContainer::default();
        state.attach(Emitter::from_sender(tx, "/main"));
        (state, rx)
    }

    fn envelope(message: Value) -> MessageEnvelope {
        serde_json::from_value(json!({ "msghtml": message })).unwrap()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<OutboundFrame>) -> Vec<OutboundFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_duplicate_within_window_scenario() {
        let (mut state, _rx) = container();
        state.on_message(envelope(json!({ "uid": "m1", "flight": "UAL123", "tail": "N1", "timestamp": 100.0, "label": "H1", "text": "POS" })));
        state.on_message(envelope(json!({ "uid": "m2", "flight": "UAL123", "tail": "N1", "timestamp": 160.0, "label": "H1", "text": "POS" })));

        assert_eq!(state.messages().len(), 1);
        let group = state.messages().get_group(&IdentityKey::tail("N1")).unwrap();
        assert_eq!(group.len(), 1);
        assert_eq!(group.messages[0].uid, "m1");
        assert_eq!(group.messages[0].duplicates, 1);
    }

    #[test]
    fn test_batch_equals_singular() {
        let messages = vec![
            json!({ "uid": "a", "flight": "UAL1", "timestamp": 1.0, "text": "ONE" }),
            json!({ "timestamp": 2.0, "text": "NO UID" }),
            json!({ "uid": "b", "icao_hex": "abc123", "timestamp": 3.0, "text": "TWO" }),
            json!({ "uid": "c", "flight": "UAL1", "timestamp": 4.0, "text": "ONE" }),
            json!("garbage"),
        ];

        let (mut single, _rx1) = container();
        for message in &messages {
            if let Ok(envelope) = serde_json::from_value::<MessageEnvelope>(json!({ "msghtml": message })) {
                single.on_message(envelope);
            }
        }

        let (mut batched, _rx2) = container();
        batched.on_message_batch(serde_json::from_value(json!({ "messages": messages })).unwrap());

        let view = |state: &StateContainer| -> Vec<(String, Vec<(String, u32)>)> {
            state
                .messages()
                .groups_by_recency()
                .map(|g| {
                    (
                        g.key.value.clone(),
                        g.messages.iter().map(|m| (m.uid.clone(), m.duplicates)).collect(),
                    )
                })
                .collect()
        };
        assert_eq!(view(&single), view(&batched));
        assert_eq!(batched.messages().message_count(), 2);
    }

    #[test]
    fn test_batch_commits_once() {
        let (mut state, _rx) = container();
        let mut changes = state.subscribe();
        state.on_message_batch(
            serde_json::from_value(json!({
                "messages": [
                    { "uid": "a", "flight": "UAL1", "timestamp": 1.0 },
                    { "uid": "b", "flight": "UAL2", "timestamp": 2.0 },
                ],
                "loading": true,
            }))
            .unwrap(),
        );

        let change = changes.try_recv().unwrap();
        assert!(change.touches(Slice::Messages));
        assert!(change.touches(Slice::History));
        assert!(changes.try_recv().is_err());
        assert!(state.history().loading);
    }

    #[test]
    fn test_warm_up_on_every_connect() {
        let (mut state, mut rx) = container();
        assert_eq!(state.mount(), 0);

        state.on_connect();
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 8);
        assert!(frames.iter().all(|f| f.event == "request_time_series"));
        assert_eq!(frames[0].data["time_period"], "1hr");
        assert_eq!(frames[7].data["time_period"], "1yr");

        state.on_disconnect("transport close");
        assert!(state.connection().last_disconnect.is_some());
        assert!(drain(&mut rx).is_empty());

        state.on_connect();
        state.on_reconnect(1);
        assert_eq!(drain(&mut rx).len(), 8);
        assert_eq!(state.connection().reconnect_attempts, 1);
    }

    #[test]
    fn test_mount_while_connected_warms_up() {
        let (mut state, mut rx) = container();
        state.on_connect();
        assert!(drain(&mut rx).is_empty());
        assert_eq!(state.mount(), 8);
    }

    #[test]
    fn test_disconnect_keeps_state() {
        let (mut state, _rx) = container();
        state.on_connect();
        state.on_message(envelope(json!({ "uid": "m1", "flight": "UAL1", "timestamp": 1.0 })));
        state.on_disconnect("io error");

        assert!(!state.is_connected());
        assert_eq!(state.messages().message_count(), 1);
    }

    #[test]
    fn test_alert_counted_and_notified_once() {
        let (mut state, _rx) = container();
        state.on_alert_terms(AlertTermsConfig { terms: vec!["mayday".into()], ignore: vec![] });

        state.on_message(envelope(json!({ "uid": "m1", "flight": "UAL1", "timestamp": 1.0, "text": "MAYDAY MAYDAY" })));
        state.on_message(envelope(json!({ "uid": "m1", "flight": "UAL1", "timestamp": 2.0, "text": "MAYDAY MAYDAY" })));

        assert_eq!(state.alert_count(), 1);
        let notifications = state.take_notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].terms, vec!["MAYDAY"]);
        assert!(state.take_notifications().is_empty());

        let group = state.messages().get_group(&IdentityKey::flight("UAL1")).unwrap();
        assert!(group.has_alerts);
        assert_eq!(group.alert_count, 1);

        state.reset_alert_count();
        assert_eq!(state.alert_count(), 0);
    }

    #[test]
    fn test_multipart_match_across_parts() {
        let (mut state, _rx) = container();
        state.on_alert_terms(AlertTermsConfig { terms: vec!["LOWFUEL".into()], ignore: vec![] });

        state.on_message(envelope(json!({ "uid": "p1", "flight": "UAL1", "timestamp": 1.0, "label": "H1", "msgno": "M01A", "text": "LOW" })));
        assert_eq!(state.alert_count(), 0);
        state.on_message(envelope(json!({ "uid": "p2", "flight": "UAL1", "timestamp": 2.0, "label": "H1", "msgno": "M02A", "text": "FUEL" })));

        let group = state.messages().get_group(&IdentityKey::flight("UAL1")).unwrap();
        assert_eq!(group.len(), 1);
        assert_eq!(group.messages[0].text.as_deref(), Some("LOWFUEL"));
        assert!(group.messages[0].alert.matched);
        assert_eq!(state.alert_count(), 1);
    }

    #[test]
    fn test_alert_terms_push_does_not_rematch() {
        let (mut state, _rx) = container();
        state.on_message(envelope(json!({ "uid": "m1", "flight": "UAL1", "timestamp": 1.0, "text": "MAYDAY" })));
        state.on_alert_terms(AlertTermsConfig { terms: vec!["MAYDAY".into()], ignore: vec![] });

        let group = state.messages().get_group(&IdentityKey::flight("UAL1")).unwrap();
        assert!(!group.has_alerts);
        assert_eq!(state.alert_count(), 0);
    }

    #[test]
    fn test_update_alert_terms_emits_when_connected() {
        let (mut state, mut rx) = container();
        assert!(!state.update_alert_terms(["fuel"], ["test"]));
        assert!(state.alert_terms().terms().eq(["FUEL"]));

        state.on_connect();
        drain(&mut rx);
        assert!(state.update_alert_terms(["fuel", "FUEL", "mayday"], Vec::<String>::new()));
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "update_alert_terms");
        assert_eq!(frames[0].data["terms"], json!(["FUEL", "MAYDAY"]));
    }

    #[test]
    fn test_alert_feed_is_separate() {
        let (mut state, _rx) = container();
        state.on_alert_message(envelope(json!({ "uid": "a1", "tail": "N1", "timestamp": 1.0, "matched": true, "matched_text": ["FUEL"] })));

        assert_eq!(state.alerts().len(), 1);
        assert!(state.messages().is_empty());
        assert_eq!(state.alert_count(), 0);
        assert!(state.alerts().get_group(&IdentityKey::tail("N1")).unwrap().has_alerts);
    }

    #[test]
    fn test_time_series_error_keeps_entries() {
        let (mut state, _rx) = container();
        let t = 1_700_000_000_000_i64;
        state.on_time_series(TimeSeriesPush {
            time_period: "1hr".into(),
            data: vec![],
            start: t - 3_600_000,
            end: t,
            points: 60,
            error: None,
        });
        state.on_time_series(TimeSeriesPush {
            time_period: "1hr".into(),
            data: vec![],
            start: 0,
            end: 0,
            points: 0,
            error: Some("rrd unavailable".into()),
        });

        assert_eq!(state.last_error(), Some("rrd unavailable"));
        let chart = state.chart(WindowKey::OneHour).unwrap();
        assert_eq!((chart.start_ms, chart.end_ms), (t - 3_600_000, t));
        assert!(state.time_series(WindowKey::SixHours).is_loading());
    }

    #[test]
    fn test_unknown_window_discarded() {
        let (mut state, _rx) = container();
        let mut changes = state.subscribe();
        state.on_time_series(TimeSeriesPush {
            time_period: "2hr".into(),
            data: vec![],
            start: 0,
            end: 1,
            points: 0,
            error: None,
        });
        assert!(changes.try_recv().is_err());
        assert!(WindowKey::ALL.iter().all(|&w| state.time_series(w).is_loading()));
    }

    #[test]
    fn test_snapshot_replaces_and_pairs() {
        let (mut state, _rx) = container();
        state.on_message(envelope(json!({ "uid": "m1", "flight": "UAL123", "timestamp": 1.0 })));
        state.on_aircraft_snapshot(AircraftSnapshotPush {
            now: 1.0,
            aircraft: vec![json!({ "hex": "AAAAAA", "flight": "UAL123" }), json!({ "hex": "BBBBBB" })],
        });
        state.on_aircraft_snapshot(AircraftSnapshotPush {
            now: 2.0,
            aircraft: vec![json!({ "hex": "AAAAAA", "flight": "UAL123" })],
        });

        assert_eq!(state.snapshot().len(), 1);
        let pairings = state.pairings();
        assert_eq!(pairings.len(), 1);
        assert_eq!(pairings["AAAAAA"].unwrap().matched_on, IdentityKind::Flight);
    }

    #[test]
    fn test_lowering_caps_trims() {
        let (mut state, _rx) = container();
        for i in 0..5 {
            state.on_message(envelope(json!({ "uid": format!("m{i}"), "flight": format!("F{i}"), "timestamp": f64::from(i) })));
        }
        let prefs = Preferences { max_message_groups: 2, ..Preferences::default() };
        state.apply_preferences(prefs).unwrap();

        assert_eq!(state.messages().len(), 2);
        assert_eq!(
            state.messages().caps(),
            GroupCaps { max_messages_per_group: 50, max_groups: 2 }
        );
        assert!(state.messages().get_group(&IdentityKey::flight("F4")).is_some());
    }

    #[test]
    fn test_invalid_import_leaves_state() {
        let (mut state, _rx) = container();
        let before = state.preferences().clone();
        assert!(state.import_preferences("{\"version\": 1, \"preferences\": {}}").is_err());
        assert_eq!(state.preferences(), &before);

        let exported = state.export_preferences().unwrap();
        state.import_preferences(&exported).unwrap();
        assert_eq!(state.preferences(), &before);
    }

    #[test]
    fn test_watch_filters_slices() {
        let (mut state, _rx) = container();
        let mut aircraft = state.watch([Slice::Aircraft]);

        state.on_station_ids(StationIds { station_ids: vec!["KSFO".into()] });
        state.on_aircraft_snapshot(AircraftSnapshotPush { now: 1.0, aircraft: vec![] });

        let change = aircraft.try_recv().unwrap();
        assert_eq!(change.slices, BTreeSet::from([Slice::Aircraft]));
        assert_eq!(change.revision, 2);
        assert!(aircraft.try_recv().is_none());
    }

    #[test]
    fn test_alert_term_counts_sorted() {
        let (mut state, _rx) = container();
        state.on_alert_term_counts(
            serde_json::from_value(json!({ "data": {
                "0": { "term": "MAYDAY", "count": 2, "id": 0 },
                "1": { "term": "FUEL", "count": 5, "id": 1 },
            }}))
            .unwrap(),
        );
        let terms: Vec<&str> = state
            .statistics()
            .alert_term_counts
            .iter()
            .map(|c| c.term.as_str())
            .collect();
        assert_eq!(terms, vec!["FUEL", "MAYDAY"]);
    }

    #[test]
    fn test_filters_apply_to_page() {
        let (mut state, _rx) = container();
        state.on_message(envelope(json!({ "uid": "m1", "flight": "UAL1", "timestamp": 1.0, "label": "SQ" })));
        state.on_message(envelope(json!({ "uid": "m2", "flight": "UAL2", "timestamp": 2.0, "label": "H1" })));

        state.set_label_exclusions(["SQ"]);
        assert_eq!(state.groups_page(0, 10).total_groups, 1);

        state.set_only_alerts(true);
        assert_eq!(state.groups_page(0, 10).total_groups, 0);
        state.set_only_alerts(false);
        state.set_text_filter("ual2");
        assert_eq!(state.groups_page(0, 10).groups[0].group.key.value, "UAL2");
    }
}
