//! Lifecycle of one progress aggregation run.
//!
//! [`ProgressManager::run`] binds the receiver, spawns the listener and
//! returns a [`ProgressRun`] guard. Finishing the guard stops the listener and
//! waits for its drain-and-close sequence. [`ProgressRun::finish_after`] does
//! the same once a caller-provided body has completed, whether it succeeded or
//! not.

use crate::batching::BatchingPolicy;
use crate::cancel::CancellationToken;
use crate::error::{ProgressError, Result};
use crate::handle::ChannelHandle;
use crate::listener::{Listener, ListenerExit, ListenerReport, ListenerState};
use crate::sink::{IndicatifSink, ProgressSink};
use crate::transport::{ProgressMessage, ProgressReceiver};
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Coordinator-side entry point, created once before workers are spawned.
#[derive(Debug, Clone)]
pub struct ProgressManager {
    policy: BatchingPolicy,
    interval: u64,
    stall_timeout: Option<Duration>,
    hidden: bool,
}

impl ProgressManager {
    /// Create a manager flushing every `percent` percent of the total.
    pub fn new(percent: f64) -> Result<Self> {
        Ok(Self {
            policy: BatchingPolicy::new(percent)?,
            interval: 1,
            stall_timeout: None,
            hidden: false,
        })
    }

    /// End a run that receives nothing for `timeout` instead of waiting
    /// forever for missing completion signals.
    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = Some(timeout);
        self
    }

    /// Track progress without drawing a terminal bar.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn percent(&self) -> f64 {
        self.policy.percent()
    }

    /// Interval derived by the most recent `run`.
    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Start a run displayed on the terminal.
    ///
    /// `expected_workers` must equal the number of accumulators that will
    /// signal `done()`; without a stall timeout a shortfall keeps the listener
    /// waiting until an external stop.
    pub async fn run(
        &mut self,
        total: u64,
        expected_workers: u64,
        description: &str,
    ) -> Result<ProgressRun> {
        let sink = if self.hidden {
            IndicatifSink::hidden(total, description)
        } else {
            IndicatifSink::new(total, description)
        };
        self.run_with_sink(total, expected_workers, sink).await
    }

    /// Start a run that reports into a caller-provided sink.
    pub async fn run_with_sink<K: ProgressSink>(
        &mut self,
        total: u64,
        expected_workers: u64,
        sink: K,
    ) -> Result<ProgressRun> {
        if total == 0 {
            return Err(ProgressError::config("total", "must be positive"));
        }
        if expected_workers == 0 {
            return Err(ProgressError::config(
                "expected_workers",
                "must be at least 1",
            ));
        }

        self.interval = self.policy.interval(total);

        let (tx, rx) = mpsc::unbounded_channel();
        let receiver = ProgressReceiver::bind(tx.clone()).await?;
        let handle = ChannelHandle {
            addr: receiver.addr(),
            interval: self.interval,
            percent: self.policy.percent(),
        };

        let stop = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(ListenerState::Idle);
        let listener = Listener::new(
            rx,
            sink,
            expected_workers,
            stop.clone(),
            self.stall_timeout,
            state_tx,
        );
        let task = tokio::spawn(listener.run(receiver));

        info!(
            "Progress run started: total={}, workers={}, interval={}",
            total, expected_workers, self.interval
        );

        Ok(ProgressRun {
            handle,
            stop,
            state_rx,
            local_tx: tx,
            stall_timeout: self.stall_timeout,
            task: Some(task),
        })
    }
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self {
            policy: BatchingPolicy::default(),
            interval: 1,
            stall_timeout: None,
            hidden: false,
        }
    }
}

/// Guard for a running aggregation.
///
/// Dropping the guard only signals the stop. It does not wait for the
/// listener to drain and close the display, so callers should end every exit
/// path with [`ProgressRun::finish`] or use [`ProgressRun::finish_after`].
#[derive(Debug)]
pub struct ProgressRun {
    handle: ChannelHandle,
    stop: CancellationToken,
    state_rx: watch::Receiver<ListenerState>,
    local_tx: mpsc::UnboundedSender<ProgressMessage>,
    stall_timeout: Option<Duration>,
    task: Option<JoinHandle<ListenerReport>>,
}

impl ProgressRun {
    /// Channel reference to hand to workers.
    pub fn handle(&self) -> &ChannelHandle {
        &self.handle
    }

    /// A token that stops the listener when cancelled.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Request an external stop. The listener still drains before closing.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn state(&self) -> ListenerState {
        *self.state_rx.borrow()
    }

    /// Report units completed by the coordinator itself.
    pub fn advance(&self, n: u64) -> Result<()> {
        let Some(message) = ProgressMessage::delta(n) else {
            return Ok(());
        };
        self.local_tx
            .send(message)
            .map_err(|_| ProgressError::transport(Some(self.handle.addr), "listener has shut down"))
    }

    /// Wait for every expected worker to signal completion (or for the stall
    /// timeout / an external stop), without stopping the listener first.
    pub async fn wait(mut self) -> Result<ListenerReport> {
        self.join().await
    }

    /// Stop the listener, wait for its final drain, and close the display.
    pub async fn finish(mut self) -> Result<ListenerReport> {
        self.stop.cancel();
        self.join().await
    }

    /// Like [`ProgressRun::finish`], but a stalled run is an error.
    pub async fn finish_strict(self) -> Result<ListenerReport> {
        let stall_timeout = self.stall_timeout;
        let report = self.finish().await?;
        if report.exit == ListenerExit::Stalled {
            return Err(ProgressError::StalledCompletion {
                completed: report.completed_workers,
                expected: report.expected_workers,
                idle: stall_timeout.unwrap_or_default(),
            });
        }
        Ok(report)
    }

    /// Await `body`, then finish the run on both success and failure.
    ///
    /// A failure of `body` takes precedence over a failure to join the
    /// listener, which is only logged in that case.
    pub async fn finish_after<T, E, F>(
        self,
        body: F,
    ) -> std::result::Result<(T, ListenerReport), E>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: From<ProgressError>,
    {
        let outcome = body.await;
        let finished = self.finish().await;
        match (outcome, finished) {
            (Ok(value), Ok(report)) => Ok((value, report)),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), Ok(_)) => Err(e),
            (Err(e), Err(join_err)) => {
                warn!("Progress listener did not finish cleanly: {}", join_err);
                Err(e)
            }
        }
    }

    async fn join(&mut self) -> Result<ListenerReport> {
        let task = self
            .task
            .take()
            .ok_or_else(|| ProgressError::Other("progress run already joined".to_string()))?;
        task.await
            .map_err(|e| ProgressError::Other(format!("progress listener task failed: {}", e)))
    }
}

impl Drop for ProgressRun {
    fn drop(&mut self) {
        if self.task.is_some() {
            warn!("Progress run dropped without finish(); stopping listener in background");
            self.stop.cancel();
        }
    }
}
