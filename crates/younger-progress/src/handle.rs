//! Serializable reference to a coordinator's progress channel.
//!
//! Only this handle crosses the process boundary: workers get the receiver's
//! loopback address plus the batching parameters, never shared memory.

use crate::accumulator::Accumulator;
use crate::config::TransportConfig;
use crate::error::{ProgressError, Result};
use crate::transport::ProgressSender;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::debug;

/// Channel reference handed to each worker at spawn time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelHandle {
    /// Loopback address of the coordinator's receiver.
    pub addr: SocketAddr,
    /// Flush interval derived from the run's total.
    pub interval: u64,
    /// Batching percentage the interval was derived from.
    pub percent: f64,
}

impl ChannelHandle {
    /// Serialize to a JSON string suitable for an argument or env var.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a handle produced by [`ChannelHandle::encode`].
    pub fn decode(encoded: &str) -> Result<Self> {
        let handle: Self = serde_json::from_str(encoded).map_err(|e| ProgressError::Validation {
            field: "channel_handle".to_string(),
            message: e.to_string(),
        })?;
        if handle.interval == 0 {
            return Err(ProgressError::Validation {
                field: "channel_handle".to_string(),
                message: "interval must be at least 1".to_string(),
            });
        }
        Ok(handle)
    }

    /// Environment variable name and value for passing the handle to a child.
    pub fn to_env(&self) -> Result<(&'static str, String)> {
        Ok((TransportConfig::HANDLE_ENV_VAR, self.encode()?))
    }

    /// Read the handle a coordinator placed in this process's environment.
    ///
    /// A missing variable means the coordinator never set up a channel, which
    /// is reported as `TransportUnavailable`.
    pub fn from_env() -> Result<Self> {
        let encoded = std::env::var(TransportConfig::HANDLE_ENV_VAR).map_err(|e| {
            ProgressError::transport(
                None,
                format!("{} not usable: {}", TransportConfig::HANDLE_ENV_VAR, e),
            )
        })?;
        Self::decode(&encoded)
    }

    /// Open a connection and wrap it in a fresh accumulator.
    pub fn connect(&self) -> Result<Accumulator> {
        let sender = ProgressSender::connect(self.addr)?;
        debug!(
            "Reporting every {} units ({}% of the total) to {}",
            self.interval, self.percent, self.addr
        );
        Ok(Accumulator::new(sender, self.interval))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ChannelHandle {
        ChannelHandle {
            addr: "127.0.0.1:40123".parse().unwrap(),
            interval: 5,
            percent: 0.5,
        }
    }

    #[test]
    fn test_encoded_handle_carries_reference_only() {
        let encoded = sample().encode().unwrap();
        assert_eq!(
            encoded,
            r#"{"addr":"127.0.0.1:40123","interval":5,"percent":0.5}"#
        );
        assert_eq!(ChannelHandle::decode(&encoded).unwrap(), sample());
    }

    #[test]
    fn test_decode_rejects_zero_interval() {
        let err = ChannelHandle::decode(r#"{"addr":"127.0.0.1:1","interval":0,"percent":1.0}"#)
            .unwrap_err();
        assert!(matches!(err, ProgressError::Validation { .. }));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(ChannelHandle::decode("not a handle").is_err());
    }

    #[test]
    fn test_to_env_uses_configured_name() {
        let (name, value) = sample().to_env().unwrap();
        assert_eq!(name, TransportConfig::HANDLE_ENV_VAR);
        assert_eq!(ChannelHandle::decode(&value).unwrap(), sample());
    }

    #[test]
    fn test_connect_without_receiver_fails() {
        let handle = ChannelHandle {
            addr: "127.0.0.1:1".parse().unwrap(),
            interval: 1,
            percent: 1.0,
        };
        assert!(matches!(
            handle.connect().unwrap_err(),
            ProgressError::TransportUnavailable { .. }
        ));
    }
}
