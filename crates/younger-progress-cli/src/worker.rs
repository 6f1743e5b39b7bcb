//! Worker side: process one chunk, reporting progress per item.

use anyhow::{Context, Result};
use std::ops::Range;
use std::time::Duration;
use tracing::debug;
use younger_progress::ChannelHandle;

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub items: Range<u64>,
    pub delay: Duration,
    pub panic_at: Option<u64>,
}

/// Runs on a blocking thread. The accumulator flushes and signals completion
/// when dropped, so a panic below still reports the items already processed.
pub fn run(options: WorkerOptions) -> Result<()> {
    let handle = ChannelHandle::from_env().context("worker started without a progress channel")?;
    let mut progress = handle
        .connect()
        .context("cannot reach the coordinator's progress channel")?;

    for item in options.items.clone() {
        if options.panic_at == Some(item) {
            panic!("simulated failure at item {}", item);
        }
        if !options.delay.is_zero() {
            std::thread::sleep(options.delay);
        }
        progress.update(1)?;
    }

    debug!("Worker {} finished {:?}", std::process::id(), options.items);
    progress.done()?;
    Ok(())
}
