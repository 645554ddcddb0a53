//! Engine configuration
//!
//! A plain value handed to the engine when it starts and handed back when it
//! shuts down. The engine never reaches into settings owned by the UI.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::protocol::{DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT_MS};

/// Longest read timeout that still notices a disconnect request promptly
pub const MAX_READ_TIMEOUT_MS: u64 = 250;

/// Shortest read timeout before the worker degenerates into spinning
pub const MIN_READ_TIMEOUT_MS: u64 = 10;

/// Default interval between automatic status polls
pub const DEFAULT_STATUS_POLL_INTERVAL_MS: u64 = 200;

/// Default limit on a single received line
pub const DEFAULT_MAX_LINE_LEN: usize = 1024;

/// Communication engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Serial port name, also the last port a connection was made on
    pub port_name: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Serial read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Interval between automatic `?` polls while connected; 0 disables them
    pub status_poll_interval_ms: u64,
    /// Partial lines longer than this are discarded as noise
    pub max_line_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            status_poll_interval_ms: DEFAULT_STATUS_POLL_INTERVAL_MS,
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

impl EngineConfig {
    /// Read timeout clamped to the range the worker loop supports
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(
            self.read_timeout_ms
                .clamp(MIN_READ_TIMEOUT_MS, MAX_READ_TIMEOUT_MS),
        )
    }

    /// `None` when automatic polling is disabled
    pub fn status_poll_interval(&self) -> Option<Duration> {
        (self.status_poll_interval_ms > 0)
            .then(|| Duration::from_millis(self.status_poll_interval_ms))
    }
}

/// Parameters of one connect attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`
    pub port_name: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Upper bound on a single blocking read
    pub read_timeout: Duration,
}

impl ConnectRequest {
    /// Request for an explicit port and line settings
    pub fn new(port_name: impl Into<String>, baud_rate: u32, read_timeout: Duration) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            read_timeout,
        }
    }

    /// Connect using the port and timing stored in `config`
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            port_name: config.port_name.clone(),
            baud_rate: config.baud_rate,
            read_timeout: config.read_timeout(),
        }
    }
}
