//! Centralized configuration for progress aggregation.
//!
//! Constants for the loopback transport, the batching policy and the terminal
//! display.

use std::time::Duration;

/// Loopback transport configuration.
pub struct TransportConfig;

impl TransportConfig {
    /// Address the coordinator binds its receiver to (OS-assigned port).
    pub const BIND_ADDR: &'static str = "127.0.0.1:0";
    /// Largest accepted frame payload. Progress messages are a few dozen bytes.
    pub const MAX_FRAME_SIZE: usize = 4096;
    pub const MAX_CONNECTIONS: usize = 1024;
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
    /// Upper bound on a single worker-side frame write.
    pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);
    /// Quiet period after which a draining connection is considered empty.
    pub const DRAIN_GRACE: Duration = Duration::from_millis(50);
    /// Hard cap on draining a connection whose worker keeps sending.
    pub const DRAIN_DEADLINE: Duration = Duration::from_secs(2);
    pub const READ_BUFFER_CAPACITY: usize = 1024;
    /// Environment variable carrying the serialized channel handle to workers.
    pub const HANDLE_ENV_VAR: &'static str = "YOUNGER_PROGRESS_HANDLE";
}

/// Batching policy configuration.
pub struct BatchingConfig;

impl BatchingConfig {
    /// Default flush percentage (0.5% of the total per transmission).
    pub const DEFAULT_PERCENT: f64 = 0.5;
}

/// Terminal display configuration.
pub struct DisplayConfig;

impl DisplayConfig {
    pub const BAR_TEMPLATE: &'static str =
        "{msg}: {percent:>3}%|{bar:40.cyan/blue}| {pos}/{len} [{elapsed_precise}<{eta_precise}, {per_sec}]";
    pub const PROGRESS_CHARS: &'static str = "##-";
    pub const REFRESH_RATE_HZ: u8 = 10;
    pub const DEFAULT_DESCRIPTION: &'static str = "Processing";
}
