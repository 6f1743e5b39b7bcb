//! Younger Progress - cross-process progress aggregation.
//!
//! Many worker processes each handle a disjoint chunk of a large workload and
//! report progress to one coordinating process, which shows a single combined
//! progress bar. Workers batch their counts locally and ship them over a
//! loopback channel; the coordinator's listener applies them and counts
//! completed workers.
//!
//! # Example
//!
//! ```rust,ignore
//! use younger_progress::{split_even, ChannelHandle, ProgressManager};
//!
//! // Coordinator
//! let chunks = split_even(items.len() as u64, 4)?;
//! let mut manager = ProgressManager::new(0.5)?;
//! let run = manager.run(items.len() as u64, chunks.len() as u64, "Converting").await?;
//! let (name, value) = run.handle().to_env()?;
//! // ... spawn one worker process per chunk with `name=value` in its environment ...
//! let report = run.finish().await?;
//!
//! // Worker
//! let mut progress = ChannelHandle::from_env()?.connect()?;
//! for item in chunk {
//!     convert(item)?;
//!     progress.update(1)?;
//! }
//! progress.done()?;
//! ```

pub mod accumulator;
pub mod batching;
pub mod cancel;
pub mod chunks;
pub mod config;
pub mod error;
pub mod handle;
pub mod listener;
pub mod manager;
pub mod sink;
pub mod transport;

// Re-export commonly used types
pub use accumulator::Accumulator;
pub use batching::{flush_interval, BatchingPolicy};
pub use cancel::CancellationToken;
pub use chunks::split_even;
pub use error::{ProgressError, Result};
pub use handle::ChannelHandle;
pub use listener::{ListenerExit, ListenerReport, ListenerState};
pub use manager::{ProgressManager, ProgressRun};
pub use sink::{IndicatifSink, ProgressSink};
pub use transport::{MessageSender, ProgressMessage};
