//! Worker-side progress accumulator.
//!
//! Buffers completed units locally and only transmits once the batching
//! interval is reached. Dropping an accumulator that was not finished with
//! [`Accumulator::done`] flushes and signals completion, so unwinding out of a
//! worker's unit of work still reports every unit it counted.

use crate::error::{ProgressError, Result};
use crate::transport::{MessageSender, ProgressMessage, ProgressSender};
use tracing::{debug, warn};

/// Per-worker progress buffer.
#[derive(Debug)]
pub struct Accumulator<S: MessageSender = ProgressSender> {
    /// `None` once finished or after a transport failure.
    sender: Option<S>,
    accumulated: u64,
    interval: u64,
    reported: u64,
}

impl<S: MessageSender> Accumulator<S> {
    /// Wrap a sender. An interval of zero is treated as one.
    pub fn new(sender: S, interval: u64) -> Self {
        Self {
            sender: Some(sender),
            accumulated: 0,
            interval: interval.max(1),
            reported: 0,
        }
    }

    /// Record `n` completed units, transmitting once the interval is reached.
    ///
    /// `update(0)` is a no-op.
    pub fn update(&mut self, n: u64) -> Result<()> {
        self.accumulated = self.accumulated.saturating_add(n);
        if self.accumulated >= self.interval {
            self.flush()?;
        }
        Ok(())
    }

    /// Transmit any buffered units now. Does nothing when the buffer is empty.
    pub fn flush(&mut self) -> Result<()> {
        let Some(message) = ProgressMessage::delta(self.accumulated) else {
            return self.sender_ready();
        };
        self.send(message)?;
        self.reported += self.accumulated;
        self.accumulated = 0;
        Ok(())
    }

    /// Flush, then signal that this worker has finished its chunk.
    pub fn done(mut self) -> Result<()> {
        self.finish()
    }

    /// Units buffered but not yet transmitted.
    pub fn accumulated(&self) -> u64 {
        self.accumulated
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Units transmitted so far.
    pub fn reported(&self) -> u64 {
        self.reported
    }

    fn finish(&mut self) -> Result<()> {
        self.flush()?;
        self.send(ProgressMessage::Done)?;
        self.sender = None;
        debug!("Worker {} reported {} units", std::process::id(), self.reported);
        Ok(())
    }

    fn sender_ready(&self) -> Result<()> {
        match self.sender {
            Some(_) => Ok(()),
            None => Err(ProgressError::transport(None, "progress channel already closed")),
        }
    }

    fn send(&mut self, message: ProgressMessage) -> Result<()> {
        let sender = self
            .sender
            .as_mut()
            .ok_or_else(|| ProgressError::transport(None, "progress channel already closed"))?;
        if let Err(e) = sender.send(message) {
            // Transport failures are fatal; never retry from here or from Drop
            self.sender = None;
            return Err(e);
        }
        Ok(())
    }
}

impl<S: MessageSender> Drop for Accumulator<S> {
    fn drop(&mut self) {
        if self.sender.is_none() {
            return;
        }
        if std::thread::panicking() {
            warn!(
                "Worker {} unwinding, flushing {} buffered units",
                std::process::id(),
                self.accumulated
            );
        }
        if let Err(e) = self.finish() {
            warn!("Failed to flush progress on worker exit: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records every message; optionally fails after `fail_after` sends.
    #[derive(Clone, Default)]
    struct RecordingSender {
        sent: Arc<Mutex<Vec<ProgressMessage>>>,
        fail_after: Option<usize>,
    }

    impl RecordingSender {
        fn messages(&self) -> Vec<ProgressMessage> {
            self.sent.lock().unwrap().clone()
        }

        fn delta_sum(&self) -> u64 {
            self.messages().iter().map(ProgressMessage::units).sum()
        }

        fn done_count(&self) -> usize {
            self.messages()
                .iter()
                .filter(|m| **m == ProgressMessage::Done)
                .count()
        }
    }

    impl MessageSender for RecordingSender {
        fn send(&mut self, message: ProgressMessage) -> Result<()> {
            let mut sent = self.sent.lock().unwrap();
            if self.fail_after.is_some_and(|limit| sent.len() >= limit) {
                return Err(ProgressError::transport(None, "broken pipe"));
            }
            sent.push(message);
            Ok(())
        }
    }

    fn delta(n: u64) -> ProgressMessage {
        ProgressMessage::delta(n).unwrap()
    }

    #[test]
    fn test_update_batches_until_interval() {
        let sender = RecordingSender::default();
        let mut acc = Accumulator::new(sender.clone(), 10);

        for _ in 0..9 {
            acc.update(1).unwrap();
        }
        assert!(sender.messages().is_empty());
        assert_eq!(acc.accumulated(), 9);

        acc.update(1).unwrap();
        assert_eq!(sender.messages(), vec![delta(10)]);
        assert_eq!(acc.accumulated(), 0);
    }

    #[test]
    fn test_large_update_sends_whole_buffer() {
        let sender = RecordingSender::default();
        let mut acc = Accumulator::new(sender.clone(), 5);

        acc.update(3).unwrap();
        acc.update(9).unwrap();

        assert_eq!(sender.messages(), vec![delta(12)]);
        assert!(acc.accumulated() < acc.interval());
    }

    #[test]
    fn test_sum_of_deltas_matches_updates() {
        let updates = [1u64, 7, 3, 0, 12, 5, 5, 1, 9, 2, 4];
        for interval in [1u64, 2, 5, 10, 100] {
            let sender = RecordingSender::default();
            let mut acc = Accumulator::new(sender.clone(), interval);
            for n in updates {
                acc.update(n).unwrap();
                assert!(acc.accumulated() < interval);
            }
            acc.flush().unwrap();

            assert_eq!(sender.delta_sum(), updates.iter().sum::<u64>());
            assert_eq!(acc.reported(), updates.iter().sum::<u64>());
            assert!(sender.messages().iter().all(|m| m.units() > 0));
        }
    }

    #[test]
    fn test_flush_is_idempotent() {
        let sender = RecordingSender::default();
        let mut acc = Accumulator::new(sender.clone(), 100);

        acc.update(4).unwrap();
        acc.flush().unwrap();
        acc.flush().unwrap();

        assert_eq!(sender.messages(), vec![delta(4)]);
    }

    #[test]
    fn test_done_flushes_then_signals_once() {
        let sender = RecordingSender::default();
        let mut acc = Accumulator::new(sender.clone(), 10);

        acc.update(3).unwrap();
        acc.done().unwrap();

        assert_eq!(sender.messages(), vec![delta(3), ProgressMessage::Done]);
    }

    #[test]
    fn test_drop_flushes_and_signals_done() {
        let sender = RecordingSender::default();
        {
            let mut acc = Accumulator::new(sender.clone(), 10);
            acc.update(6).unwrap();
        }

        assert_eq!(sender.messages(), vec![delta(6), ProgressMessage::Done]);
    }

    #[test]
    fn test_panic_in_unit_of_work_still_reports() {
        let sender = RecordingSender::default();
        let worker_sender = sender.clone();

        let result = std::panic::catch_unwind(move || {
            let mut acc = Accumulator::new(worker_sender, 10);
            acc.update(2).unwrap();
            panic!("conversion failed");
        });

        assert!(result.is_err());
        assert_eq!(sender.delta_sum(), 2);
        assert_eq!(sender.done_count(), 1);
    }

    #[test]
    fn test_zero_interval_clamps_to_one() {
        let sender = RecordingSender::default();
        let mut acc = Accumulator::new(sender.clone(), 0);

        acc.update(1).unwrap();
        assert_eq!(acc.interval(), 1);
        assert_eq!(sender.messages(), vec![delta(1)]);
    }

    #[test]
    fn test_transport_failure_is_fatal_and_not_retried() {
        let sender = RecordingSender {
            fail_after: Some(1),
            ..Default::default()
        };
        let mut acc = Accumulator::new(sender.clone(), 1);

        acc.update(1).unwrap();
        let err = acc.update(1).unwrap_err();
        assert!(matches!(err, ProgressError::TransportUnavailable { .. }));

        let err = acc.update(1).unwrap_err();
        assert!(matches!(err, ProgressError::TransportUnavailable { .. }));
        assert!(acc.flush().is_err());

        drop(acc);
        assert_eq!(sender.messages(), vec![delta(1)]);
    }
}
