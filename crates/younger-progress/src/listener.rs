//! Coordinator-side listener that aggregates worker progress.
//!
//! The listener owns the display sink and the coordinator counters. It waits
//! on the message channel and the stop token at the same time, so a stop is
//! observed immediately without polling.
//!
//! # State machine
//!
//! ```text
//! Idle -> Running -> Draining -> Closed
//! ```
//!
//! `Running -> Draining` happens when every expected worker signalled `Done`,
//! on external stop, or when the optional stall timeout expires. `Draining`
//! first lets the receiver forward everything still in flight on worker
//! sockets, then applies every queued message without waiting for more, then
//! closes the sink.

use crate::cancel::CancellationToken;
use crate::sink::ProgressSink;
use crate::transport::{ProgressMessage, ReceiverHandle};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Lifecycle state of a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerState {
    Idle,
    Running,
    Draining,
    Closed,
}

/// Why the listener left `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerExit {
    /// `completed_workers` reached `expected_workers`.
    AllWorkersDone,
    /// External stop was requested.
    Stopped,
    /// No message arrived within the stall timeout.
    Stalled,
}

/// Final coordinator counters after the listener closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ListenerReport {
    pub displayed_total: u64,
    pub completed_workers: u64,
    pub expected_workers: u64,
    pub exit: ListenerExit,
}

enum Event {
    Message(ProgressMessage),
    Stop,
    Stalled,
    ChannelClosed,
}

pub(crate) struct Listener<K: ProgressSink> {
    rx: mpsc::UnboundedReceiver<ProgressMessage>,
    sink: K,
    expected_workers: u64,
    displayed_total: u64,
    completed_workers: u64,
    stop: CancellationToken,
    stall_timeout: Option<Duration>,
    state_tx: watch::Sender<ListenerState>,
}

impl<K: ProgressSink> Listener<K> {
    pub(crate) fn new(
        rx: mpsc::UnboundedReceiver<ProgressMessage>,
        sink: K,
        expected_workers: u64,
        stop: CancellationToken,
        stall_timeout: Option<Duration>,
        state_tx: watch::Sender<ListenerState>,
    ) -> Self {
        Self {
            rx,
            sink,
            expected_workers,
            displayed_total: 0,
            completed_workers: 0,
            stop,
            stall_timeout,
            state_tx,
        }
    }

    /// Run to completion: receive, drain, close.
    pub(crate) async fn run(mut self, receiver: ReceiverHandle) -> ListenerReport {
        self.set_state(ListenerState::Running);
        let exit = self.receive_loop().await;

        self.set_state(ListenerState::Draining);
        receiver.drain().await;
        let mut drained = 0usize;
        while let Ok(message) = self.rx.try_recv() {
            self.apply(message);
            drained += 1;
        }
        debug!("Listener applied {} messages during drain", drained);

        self.sink.close();
        self.set_state(ListenerState::Closed);

        info!(
            "Progress listener closed ({:?}): {} units, {}/{} workers",
            exit, self.displayed_total, self.completed_workers, self.expected_workers
        );

        ListenerReport {
            displayed_total: self.displayed_total,
            completed_workers: self.completed_workers,
            expected_workers: self.expected_workers,
            exit,
        }
    }

    async fn receive_loop(&mut self) -> ListenerExit {
        while self.completed_workers < self.expected_workers {
            let event = tokio::select! {
                biased;
                _ = self.stop.cancelled() => Event::Stop,
                event = Self::next_message(&mut self.rx, self.stall_timeout) => event,
            };

            match event {
                Event::Message(message) => self.apply(message),
                Event::Stop => {
                    debug!("Progress listener received external stop");
                    return ListenerExit::Stopped;
                }
                Event::Stalled => {
                    warn!(
                        "No progress for {:?} with {}/{} workers completed; giving up",
                        self.stall_timeout.unwrap_or_default(),
                        self.completed_workers,
                        self.expected_workers
                    );
                    return ListenerExit::Stalled;
                }
                Event::ChannelClosed => {
                    warn!("Progress channel closed before all workers completed");
                    return ListenerExit::Stopped;
                }
            }
        }
        ListenerExit::AllWorkersDone
    }

    async fn next_message(
        rx: &mut mpsc::UnboundedReceiver<ProgressMessage>,
        stall_timeout: Option<Duration>,
    ) -> Event {
        let received = match stall_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx.recv()).await {
                Ok(received) => received,
                Err(_) => return Event::Stalled,
            },
            None => rx.recv().await,
        };
        match received {
            Some(message) => Event::Message(message),
            None => Event::ChannelClosed,
        }
    }

    fn apply(&mut self, message: ProgressMessage) {
        match message {
            ProgressMessage::Delta { n } => {
                self.displayed_total += n.get();
                self.sink.advance(n.get());
            }
            ProgressMessage::Done => {
                if self.completed_workers >= self.expected_workers {
                    warn!(
                        "Ignoring completion signal beyond {} expected workers",
                        self.expected_workers
                    );
                    return;
                }
                self.completed_workers += 1;
                self.sink
                    .workers_completed(self.completed_workers, self.expected_workers);
                debug!(
                    "Worker completed ({}/{})",
                    self.completed_workers, self.expected_workers
                );
            }
        }
    }

    fn set_state(&self, state: ListenerState) {
        self.state_tx.send_replace(state);
    }
}
