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

//! Duplex TCP transport with automatic reconnection.
//!
//! Inbound lines are forwarded as [`ConnectionEvent::DataReceived`]; outbound
//! frames are written as they arrive on the outbound channel. Frames queued
//! while the link is down are discarded before the next connect attempt.

use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::protocol::{OutboundFrame, DEFAULT_NAMESPACE};

/// Default dashboard server address.
pub const DEFAULT_ADDRESS: &str = "localhost:8888";

/// Configuration for the event stream connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server address in "host:port" format.
    pub address: String,
    /// Namespace stamped on outbound frames and expected on inbound ones.
    pub namespace: String,
    /// Delay before reconnecting after disconnect.
    pub reconnect_delay: Duration,
    /// Channel buffer size for received data.
    pub buffer_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            reconnect_delay: Duration::from_secs(5),
            buffer_size: 1024,
        }
    }
}

/// Where the event-stream transport is in its connect cycle.
///
/// The stream client turns these into the synthetic `connect`,
/// `reconnect` and `disconnect` events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Dialing the dashboard server.
    Connecting,
    /// Frames flow in both directions.
    Connected,
    /// The server closed the stream. A redial follows after the delay.
    Disconnected,
    /// Dial or I/O failure, with its message. A redial follows after the delay.
    Error(String),
}

/// Output of the transport task.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    StateChanged(ConnectionState),
    /// One raw JSON frame line, without the trailing newline.
    DataReceived(Vec<u8>),
}

/// Handle to a managed connection task.
pub struct Connection {
    event_rx: mpsc::Receiver<ConnectionEvent>,
    cancel_token: CancellationToken,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("cancel_token", &self.cancel_token)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Spawn the connection task. Frames sent on the other end of
    /// `outbound_rx` are written to the server while connected.
    #[must_use]
    pub fn spawn(
        config: &ConnectionConfig,
        outbound_rx: mpsc::UnboundedReceiver<OutboundFrame>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.buffer_size);
        let cancel_token = CancellationToken::new();

        let task_cancel = cancel_token.clone();
        let address = config.address.clone();
        let reconnect_delay = config.reconnect_delay;

        tokio::spawn(async move {
            connection_loop(address, event_tx, outbound_rx, task_cancel, reconnect_delay).await;
        });

        Self {
            event_rx,
            cancel_token,
        }
    }

    /// Receive the next event from the connection.
    ///
    /// Returns `None` if the connection has been shut down.
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        self.event_rx.recv().await
    }

    /// Shut down the connection.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

async fn connection_loop(
    address: String,
    event_tx: mpsc::Sender<ConnectionEvent>,
    mut outbound_rx: mpsc::UnboundedReceiver<OutboundFrame>,
    cancel_token: CancellationToken,
    reconnect_delay: Duration,
) {
    loop {
        if cancel_token.is_cancelled() {
            info!("Connection cancelled");
            return;
        }

        let mut dropped = 0usize;
        while outbound_rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("Dropped {} outbound frame(s) queued while disconnected", dropped);
        }

        if event_tx
            .send(ConnectionEvent::StateChanged(ConnectionState::Connecting))
            .await
            .is_err()
        {
            return; // Receiver dropped
        }

        info!("Connecting to {}...", address);

        match connect_and_process(&address, &event_tx, &mut outbound_rx, &cancel_token).await {
            Ok(DisconnectReason::ConnectionClosed) => {
                info!("Connection closed normally");
                let _ = event_tx
                    .send(ConnectionEvent::StateChanged(ConnectionState::Disconnected))
                    .await;
            }
            Ok(DisconnectReason::Cancelled) => {
                info!("Connection cancelled");
                return;
            }
            Err(e) => {
                error!("Connection error: {}", e);
                let _ = event_tx
                    .send(ConnectionEvent::StateChanged(ConnectionState::Error(
                        e.to_string(),
                    )))
                    .await;
            }
        }

        warn!("Reconnecting in {} ms...", reconnect_delay.as_millis());

        tokio::select! {
            () = sleep(reconnect_delay) => {}
            () = cancel_token.cancelled() => {
                info!("Connection cancelled during reconnect delay");
                return;
            }
        }
    }
}

enum DisconnectReason {
    ConnectionClosed,
    Cancelled,
}

async fn connect_and_process(
    address: &str,
    event_tx: &mpsc::Sender<ConnectionEvent>,
    outbound_rx: &mut mpsc::UnboundedReceiver<OutboundFrame>,
    cancel_token: &CancellationToken,
) -> Result<DisconnectReason, Box<dyn std::error::Error + Send + Sync>> {
    let stream = tokio::select! {
        result = TcpStream::connect(address) => result?,
        () = cancel_token.cancelled() => return Ok(DisconnectReason::Cancelled),
    };
    info!("Connected to {}", address);

    if event_tx
        .send(ConnectionEvent::StateChanged(ConnectionState::Connected))
        .await
        .is_err()
    {
        return Ok(DisconnectReason::Cancelled);
    }

    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        tokio::select! {
            line_result = lines.next_line() => {
                match line_result {
                    Ok(Some(line)) => {
                        if event_tx
                            .send(ConnectionEvent::DataReceived(line.into_bytes()))
                            .await
                            .is_err()
                        {
                            return Ok(DisconnectReason::Cancelled);
                        }
                    }
                    Ok(None) => {
                        info!("Connection closed by server");
                        return Ok(DisconnectReason::ConnectionClosed);
                    }
                    Err(e) => {
                        return Err(Box::new(e));
                    }
                }
            }

            Some(frame) = outbound_rx.recv() => {
                match frame.to_line() {
                    Ok(line) => write_half.write_all(line.as_bytes()).await?,
                    Err(e) => warn!("Failed to encode '{}' frame: {}", frame.event, e),
                }
            }

            () = cancel_token.cancelled() => {
                return Ok(DisconnectReason::Cancelled);
            }
        }
    }
}
