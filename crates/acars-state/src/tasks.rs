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

//! Cancellable background tasks.
//!
//! Each task is owned by a handle; dropping the handle stops the task.

use std::time::Duration;

use log::{debug, info};
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::protocol::OutboundCommand;
use crate::stream::Emitter;

/// Default statistics refresh interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Periodically requests signal graphs, frequencies and message counts
/// while the statistics view is active.
#[derive(Debug)]
pub struct StatsPoller {
    cancel_token: CancellationToken,
}

impl StatsPoller {
    /// Start polling. The first round of requests goes out immediately.
    #[must_use]
    pub fn start(emitter: Emitter, period: Duration) -> Self {
        let cancel_token = CancellationToken::new();
        let task_cancel = cancel_token.clone();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!("Statistics polling every {}s", period.as_secs());

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        debug!("Requesting statistics refresh");
                        emitter.send(OutboundCommand::RequestSignalGraphs);
                        emitter.send(OutboundCommand::RequestFrequencies);
                        emitter.send(OutboundCommand::RequestCounts);
                    }
                    () = task_cancel.cancelled() => {
                        debug!("Statistics polling stopped");
                        return;
                    }
                }
            }
        });

        Self { cancel_token }
    }

    pub fn stop(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.cancel_token.is_cancelled()
    }
}

impl Drop for StatsPoller {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Delivers only the last value pushed within a quiet period.
#[derive(Debug)]
pub struct Debouncer<T> {
    delay: Duration,
    tx: mpsc::UnboundedSender<T>,
    pending: Option<CancellationToken>,
}

impl<T: Send + 'static> Debouncer<T> {
    /// Create a debouncer and the receiver its settled values arrive on.
    #[must_use]
    pub fn new(delay: Duration) -> (Self, mpsc::UnboundedReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                delay,
                tx,
                pending: None,
            },
            rx,
        )
    }

    /// Push a value, superseding any value still waiting.
    pub fn push(&mut self, value: T) {
        self.cancel();

        let token = CancellationToken::new();
        let task_token = token.clone();
        let tx = self.tx.clone();
        let delay = self.delay;

        tokio::spawn(async move {
            tokio::select! {
                () = sleep(delay) => {
                    let _ = tx.send(value);
                }
                () = task_token.cancelled() => {}
            }
        });

        self.pending = Some(token);
    }

    /// Drop the waiting value, if any.
    pub fn cancel(&mut self) {
        if let Some(token) = self.pending.take() {
            token.cancel();
        }
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        if let Some(token) = self.pending.take() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_poller_emits_each_round() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let poller = StatsPoller::start(Emitter::from_sender(tx, "/main"), Duration::from_secs(10));

        let mut events = Vec::new();
        for _ in 0..6 {
            events.push(rx.recv().await.unwrap().event);
        }
        assert_eq!(
            events,
            vec![
                "request_signal_graphs",
                "request_frequencies",
                "request_counts",
                "request_signal_graphs",
                "request_frequencies",
                "request_counts",
            ]
        );
        assert!(poller.is_running());

        drop(poller);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debouncer_keeps_last_value() {
        let (mut debouncer, mut rx) = Debouncer::new(Duration::from_millis(300));

        debouncer.push("u".to_string());
        sleep(Duration::from_millis(100)).await;
        debouncer.push("ua".to_string());
        sleep(Duration::from_millis(100)).await;
        debouncer.push("ual".to_string());

        assert_eq!(rx.recv().await.unwrap(), "ual");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debouncer_cancel() {
        let (mut debouncer, mut rx) = Debouncer::new(Duration::from_millis(300));
        debouncer.push(1);
        debouncer.cancel();
        sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }
}
