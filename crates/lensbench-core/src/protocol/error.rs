//! Protocol errors

use thiserror::Error;

/// Errors that can occur while talking to the motion controller
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("Failed to open {port}: {reason}")]
    ConnectFailed { port: String, reason: String },

    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Port enumeration failed: {0}")]
    EnumerationFailed(String),

    #[error("Not connected to controller")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Invalid command line: {0:?}")]
    InvalidCommand(String),

    #[error("Communication engine has stopped")]
    EngineStopped,

    #[error("Telegram decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors produced by the telegram codec.
///
/// These are local to a single received line and never end a session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("not a status telegram: {0:?}")]
    NotStatus(String),

    #[error("not a version telegram: {0:?}")]
    NotVersion(String),

    #[error("status telegram has no machine state")]
    EmptyState,

    #[error("invalid {tag} field: {value:?}")]
    InvalidField { tag: &'static str, value: String },

    #[error("version telegram has {found} segments, expected at least 3")]
    TooFewSegments { found: usize },
}
