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

//! Event stream client.
//!
//! Wraps a [`Connection`] with a per-event-name handler registry. Handlers
//! run one at a time on the task that calls [`EventStreamClient::process_next`]
//! and receive exclusive access to a caller-owned context, so the context
//! needs no locking.
//!
//! The client synthesizes three events from transport state changes:
//! `connect` whenever a connection is established, `reconnect {attempt}`
//! right after `connect` when it isn't the first one, and
//! `disconnect {reason}` when an established connection drops.

mod connection;

pub use connection::{
    Connection, ConnectionConfig, ConnectionEvent, ConnectionState, DEFAULT_ADDRESS,
};

use std::collections::HashMap;

use log::{debug, info, warn};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::protocol::events::names;
use crate::protocol::{EventParser, OutboundCommand, OutboundFrame, ParseError, Protocol};

/// A registered event handler.
pub type Handler<S> = Box<dyn FnMut(&mut S, &Value) -> Result<(), ParseError> + Send>;

/// Fire-and-forget sender of outbound commands.
///
/// Cheap to clone. Sending never blocks; frames emitted while the link is
/// down are dropped by the transport.
#[derive(Debug, Clone)]
pub struct Emitter {
    tx: mpsc::UnboundedSender<OutboundFrame>,
    namespace: String,
}

impl Emitter {
    /// Wrap an existing channel. Useful for observing emitted frames.
    #[must_use]
    pub fn from_sender(tx: mpsc::UnboundedSender<OutboundFrame>, namespace: &str) -> Self {
        Self {
            tx,
            namespace: namespace.to_string(),
        }
    }

    /// Emit a raw event in the given namespace.
    pub fn emit(&self, event: &str, data: Value, namespace: &str) -> bool {
        let frame = OutboundFrame {
            event: event.to_string(),
            namespace: namespace.to_string(),
            data,
        };
        if self.tx.send(frame).is_err() {
            debug!("Dropping '{}': event stream closed", event);
            return false;
        }
        true
    }

    /// Emit a typed command in the default namespace.
    pub fn send(&self, command: OutboundCommand) -> bool {
        let frame = command.into_frame(&self.namespace);
        let event = frame.event.clone();
        if self.tx.send(frame).is_err() {
            debug!("Dropping '{}': event stream closed", event);
            return false;
        }
        true
    }
}

/// Named-event client over the duplex connection.
pub struct EventStreamClient<S> {
    config: ConnectionConfig,
    connection: Option<Connection>,
    emitter: Emitter,
    outbound_rx: Option<mpsc::UnboundedReceiver<OutboundFrame>>,
    handlers: HashMap<String, Handler<S>>,
    parser: EventParser,
    state: ConnectionState,
    connections: u32,
}

impl<S> std::fmt::Debug for EventStreamClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut events: Vec<&String> = self.handlers.keys().collect();
        events.sort();
        f.debug_struct("EventStreamClient")
            .field("address", &self.config.address)
            .field("state", &self.state)
            .field("handlers", &events)
            .finish_non_exhaustive()
    }
}

impl<S> EventStreamClient<S> {
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let emitter = Emitter::from_sender(tx, &config.namespace);
        Self {
            config,
            connection: None,
            emitter,
            outbound_rx: Some(rx),
            handlers: HashMap::new(),
            parser: EventParser::new(),
            state: ConnectionState::Disconnected,
            connections: 0,
        }
    }

    /// Start the connection task, or return the existing channel.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(&mut self) -> Emitter {
        if self.connection.is_none() {
            if let Some(rx) = self.outbound_rx.take() {
                self.connection = Some(Connection::spawn(&self.config, rx));
            }
        }
        self.emitter.clone()
    }

    /// Register the handler for `event`, replacing any previous one.
    pub fn subscribe<F>(&mut self, event: &str, handler: F)
    where
        F: FnMut(&mut S, &Value) -> Result<(), ParseError> + Send + 'static,
    {
        if self.handlers.insert(event.to_string(), Box::new(handler)).is_some() {
            debug!("Replaced handler for '{}'", event);
        }
    }

    /// Remove the handler for `event`. Returns whether one was registered.
    pub fn unsubscribe(&mut self, event: &str) -> bool {
        self.handlers.remove(event).is_some()
    }

    /// Emit a raw event.
    pub fn emit(&self, event: &str, data: Value, namespace: &str) -> bool {
        self.emitter.emit(event, data, namespace)
    }

    #[must_use]
    pub fn emitter(&self) -> Emitter {
        self.emitter.clone()
    }

    #[must_use]
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.config.address
    }

    /// Wait for the next transport event and run the matching handlers.
    ///
    /// Returns `false` once the connection has shut down (or was never
    /// started).
    pub async fn process_next(&mut self, ctx: &mut S) -> bool {
        let Some(connection) = self.connection.as_mut() else {
            return false;
        };
        let Some(event) = connection.recv().await else {
            return false;
        };

        match event {
            ConnectionEvent::StateChanged(state) => self.on_state_changed(ctx, state),
            ConnectionEvent::DataReceived(data) => match self.parser.parse(&data) {
                Ok(Some(frame)) => {
                    if frame.namespace == self.config.namespace {
                        self.dispatch(ctx, &frame.event, &frame.data);
                    } else {
                        debug!("Ignoring '{}' in namespace {}", frame.event, frame.namespace);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Parse error: {}", e);
                }
            },
        }

        true
    }

    fn on_state_changed(&mut self, ctx: &mut S, state: ConnectionState) {
        let was_connected = self.state == ConnectionState::Connected;
        match &state {
            ConnectionState::Connected => {
                self.connections += 1;
                self.state = state;
                self.dispatch(ctx, names::CONNECT, &json!({}));
                if self.connections > 1 {
                    let attempt = self.connections - 1;
                    info!("Reconnected (attempt {})", attempt);
                    self.dispatch(ctx, names::RECONNECT, &json!({ "attempt": attempt }));
                }
            }
            ConnectionState::Disconnected | ConnectionState::Error(_) => {
                let reason = match &state {
                    ConnectionState::Error(e) => e.clone(),
                    _ => "closed by server".to_string(),
                };
                self.state = state;
                if was_connected {
                    self.dispatch(ctx, names::DISCONNECT, &json!({ "reason": reason }));
                }
            }
            ConnectionState::Connecting => {
                self.state = state;
            }
        }
    }

    /// Run the handler registered for `event`, if any.
    ///
    /// A failing handler is logged; it never stops later events. Returns
    /// whether a handler was found.
    pub fn dispatch(&mut self, ctx: &mut S, event: &str, data: &Value) -> bool {
        let Some(handler) = self.handlers.get_mut(event) else {
            debug!("No handler for '{}'", event);
            return false;
        };
        if let Err(e) = handler(ctx, data) {
            warn!("Dropping '{}' event: {}", event, e);
        }
        true
    }

    /// Shut down the connection task.
    pub fn shutdown(&self) {
        if let Some(connection) = &self.connection {
            connection.shutdown();
        }
    }
}
