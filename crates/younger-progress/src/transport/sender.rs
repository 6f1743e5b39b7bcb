//! Worker-side connection to the coordinator's progress receiver.
//!
//! Sends are blocking writes on a plain `std::net::TcpStream` with a write
//! timeout. Workers are usually synchronous code, and the accumulator must be
//! able to flush from `Drop`, where no executor is available. The receiver
//! drains every socket continuously, so a write only waits for kernel buffer
//! space and never for the display.

use super::protocol::{write_message, ProgressMessage};
use crate::config::TransportConfig;
use crate::error::{ProgressError, Result};
use std::net::{SocketAddr, TcpStream};
use tracing::debug;

/// Destination for progress messages produced by an accumulator.
pub trait MessageSender {
    /// Deliver one message, preserving order relative to earlier sends.
    fn send(&mut self, message: ProgressMessage) -> Result<()>;
}

/// Loopback TCP sender owned by a single worker.
#[derive(Debug)]
pub struct ProgressSender {
    stream: TcpStream,
    addr: SocketAddr,
}

impl ProgressSender {
    /// Connect to a coordinator's receiver.
    pub fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect_timeout(&addr, TransportConfig::CONNECT_TIMEOUT)
            .map_err(|e| ProgressError::transport(Some(addr), e))?;
        stream
            .set_write_timeout(Some(TransportConfig::WRITE_TIMEOUT))
            .map_err(|e| ProgressError::transport(Some(addr), e))?;
        stream
            .set_nodelay(true)
            .map_err(|e| ProgressError::transport(Some(addr), e))?;

        debug!("Progress sender connected to {} (PID {})", addr, std::process::id());

        Ok(Self { stream, addr })
    }

    /// Address of the coordinator's receiver.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl MessageSender for ProgressSender {
    fn send(&mut self, message: ProgressMessage) -> Result<()> {
        write_message(&mut self.stream, &message)
            .map_err(|e| ProgressError::transport(Some(self.addr), e))
    }
}
