//! Cross-process transport for progress messages.
//!
//! A loopback TCP channel: the coordinator owns one receiver, every worker
//! process opens its own connection. Frames are length-prefixed JSON.
//!
//! # Architecture
//!
//! - **Receiver**: runs in the coordinator, one reader task per worker
//!   connection, all feeding a single in-process channel
//! - **Sender**: blocking per-worker connection used by the accumulator
//! - **Protocol**: message types and framing shared by both

pub mod protocol;
pub mod receiver;
pub mod sender;

pub use protocol::ProgressMessage;
pub use receiver::{ProgressReceiver, ReceiverHandle};
pub use sender::{MessageSender, ProgressSender};
