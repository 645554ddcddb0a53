//! Connection state and the events the engine publishes

use serde::{Deserialize, Serialize};
use std::fmt;

use super::telegram::{StatusSnapshot, VersionInfo};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Opening the port
    Connecting,
    /// Connected and ready
    Connected,
    /// Session ended by an I/O failure; only a new connect request leaves this state
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Error => "Error",
        };
        f.write_str(label)
    }
}

/// Everything the engine reports, in the order it happened on the wire
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The worker entered a new connection state
    StateChanged(ConnectionState),
    /// A decoded status report
    Status(StatusSnapshot),
    /// A decoded version telegram
    Version(VersionInfo),
    /// Human-readable cause of a failed connect, a lost session or a
    /// failed port enumeration
    Error(String),
}
