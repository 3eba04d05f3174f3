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

//! Client-side state engine for a live ACARS/VDLM/HFDL monitoring dashboard.
//!
//! The crate ingests the dashboard's event stream (decoded messages, aircraft
//! snapshots, statistics pushes), groups messages per aircraft under bounded
//! memory, pairs live aircraft with their message groups and caches
//! per-window time series so a chart never sees another window's range.
//! It is organized in layers that can be used independently:
//!
//! - **Protocol layer**: frame parsing, payload validation, outbound commands
//! - **Stream layer**: async TCP event stream with automatic reconnection and
//!   a per-event handler registry
//! - **Core**: reconciliation, group store, pairing, alert matching and the
//!   time-series cache, all pure and synchronous
//! - **State layer**: the reactive container that ties the core together
//!
//! # Quick Start
//!
//! Use the [`Client`] type for full-stack operation:
//!
//! ```no_run
//! use acars_state::{Client, ClientConfig, ConnectionConfig, Slice};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut client = Client::spawn(ClientConfig {
//!         connection: ConnectionConfig {
//!             address: "localhost:8888".to_string(),
//!             ..Default::default()
//!         },
//!         ..Default::default()
//!     });
//!
//!     let mut feed = client.watch([Slice::Messages]);
//!     while client.process_next().await {
//!         if feed.try_recv().is_some() {
//!             println!("{} aircraft groups", client.state().messages().len());
//!         }
//!     }
//! }
//! ```
//!
//! # Using the Core Directly
//!
//! ```
//! use acars_state::groups::{GroupCaps, GroupStore};
//! use acars_state::message::{CanonicalMessage, IdentityKey, RawMessage};
//! use acars_state::reconciler::MessageReconciler;
//!
//! let mut store = GroupStore::new(GroupCaps::default(), MessageReconciler::default());
//! let message = CanonicalMessage::try_from(RawMessage {
//!     uid: Some("m1".to_string()),
//!     timestamp: Some(1_700_000_000.0),
//!     flight: Some("UAL123".to_string()),
//!     text: Some("POSITION REPORT".to_string()),
//!     ..Default::default()
//! })
//! .unwrap();
//! store.add_message(message);
//!
//! let group = store.get_group(&IdentityKey::flight("UAL123")).unwrap();
//! assert_eq!(group.len(), 1);
//! ```

pub mod aircraft;
pub mod alerts;
pub mod groups;
pub mod message;
pub mod pairing;
pub mod prefs;
pub mod protocol;
pub mod reconciler;
pub mod state;
pub mod stream;
pub mod tasks;
pub mod timeseries;

use std::time::Duration;

use tokio::sync::mpsc;

pub use aircraft::{AircraftPosition, AircraftSnapshot};
pub use alerts::{AlertMatch, AlertMatcher, AlertNotification, AlertTermSet};
pub use groups::{AddOutcome, GroupCaps, GroupStore, MessageGroup};
pub use message::{CanonicalMessage, IdentityKey, IdentityKind, MessageError, RawMessage};
pub use pairing::{AircraftPairingEngine, Pairing};
pub use prefs::{Preferences, PrefsError};
pub use protocol::{EventParser, OutboundCommand, ParseError, Protocol};
pub use reconciler::{MessageReconciler, ReconcilerConfig, Reconciliation};
pub use state::{Slice, SliceReceiver, StateChange, StateContainer};
pub use stream::{ConnectionConfig, ConnectionState, Emitter, EventStreamClient};
pub use tasks::{Debouncer, StatsPoller};
pub use timeseries::{CacheError, CacheLookup, TimeSeriesCache, WindowKey};

/// Configuration for the full-stack client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Connection configuration.
    pub connection: ConnectionConfig,
    /// Duplicate detection settings.
    pub reconciler: ReconcilerConfig,
    /// Initial user preferences.
    pub preferences: Preferences,
    /// Quiet period before a typed text filter is applied.
    pub filter_debounce: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            reconciler: ReconcilerConfig::default(),
            preferences: Preferences::default(),
            filter_debounce: Duration::from_millis(300),
        }
    }
}

/// Full-stack client that wires the event stream to a [`StateContainer`].
pub struct Client {
    stream: EventStreamClient<StateContainer>,
    state: StateContainer,
    filter: Debouncer<String>,
    filter_rx: mpsc::UnboundedReceiver<String>,
    poller: Option<StatsPoller>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("stream", &self.stream)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Spawn a new client with the given configuration.
    ///
    /// Starts the connection task and mounts the state container, so the
    /// time-series warm-up goes out on the first connect.
    #[must_use]
    pub fn spawn(config: ClientConfig) -> Self {
        let mut stream = EventStreamClient::new(config.connection);
        state::register_handlers(&mut stream);

        let mut state = StateContainer::new(config.preferences, config.reconciler);
        state.attach(stream.connect());
        state.mount();

        let (filter, filter_rx) = Debouncer::new(config.filter_debounce);

        Self {
            stream,
            state,
            filter,
            filter_rx,
            poller: None,
        }
    }

    /// Process the next inbound event or settled filter input.
    ///
    /// This should be called in a loop:
    ///
    /// ```no_run
    /// # use acars_state::{Client, ClientConfig};
    /// # async fn example() {
    /// let mut client = Client::spawn(ClientConfig::default());
    /// while client.process_next().await {}
    /// # }
    /// ```
    pub async fn process_next(&mut self) -> bool {
        tokio::select! {
            more = self.stream.process_next(&mut self.state) => more,
            Some(text) = self.filter_rx.recv() => {
                self.state.set_text_filter(&text);
                true
            }
        }
    }

    #[must_use]
    pub fn state(&self) -> &StateContainer {
        &self.state
    }

    /// Mutable access for user actions (alert terms, filters, preferences).
    pub fn state_mut(&mut self) -> &mut StateContainer {
        &mut self.state
    }

    /// Subscribe to changes touching any of `slices`.
    #[must_use]
    pub fn watch<I: IntoIterator<Item = Slice>>(&self, slices: I) -> SliceReceiver {
        self.state.watch(slices)
    }

    /// Feed raw text-filter input; it is applied once typing settles.
    pub fn input_text_filter(&mut self, text: &str) {
        self.filter.push(text.to_string());
    }

    /// Start polling statistics while the statistics view is active.
    pub fn start_statistics(&mut self, period: Duration) {
        if self.poller.as_ref().is_some_and(StatsPoller::is_running) {
            return;
        }
        self.poller = Some(StatsPoller::start(self.stream.emitter(), period));
    }

    pub fn stop_statistics(&mut self) {
        self.poller = None;
    }

    #[must_use]
    pub fn connection_state(&self) -> &ConnectionState {
        self.stream.state()
    }

    #[must_use]
    pub fn address(&self) -> &str {
        self.stream.address()
    }

    /// Shut down the client.
    pub fn shutdown(&mut self) {
        self.poller = None;
        self.filter.cancel();
        self.stream.shutdown();
    }
}
