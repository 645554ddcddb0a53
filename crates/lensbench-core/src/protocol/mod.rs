//! Serial Protocol Communication
//!
//! Talks to a GRBL-derived motion controller over a serial link: line
//! framing, telegram decoding, block-buffer flow control and the worker
//! thread that ties them together.

pub mod commands;
mod connection;
mod engine;
mod error;
pub mod queue;
pub mod serial;
pub mod stream;
pub mod telegram;
pub mod transport;
mod worker;

pub use commands::{
    format_status_poll, format_version_query, Axis, CommandTag, OutboundCommand,
    PARAM_LIST_QUERY, STATUS_POLL, VERSION_QUERY,
};
pub use connection::{ConnectionState, EngineEvent};
pub use engine::{Engine, EventReceiver};
pub use error::{DecodeError, ProtocolError};
pub use queue::{CommandQueue, FlowController};
pub use serial::{list_ports, try_list_ports, PortInfo};
pub use stream::{CommunicationChannel, Connector, SerialChannel, SerialConnector};
pub use telegram::{
    classify_line, decode_status, decode_version, AxisPositions, BufferState, StatusSnapshot,
    Telegram, VersionInfo,
};
pub use transport::LineTransport;

/// Default baud rate for GRBL controllers
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default serial read timeout in milliseconds
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 100;

/// Terminator of every line in both directions
pub const LINE_TERMINATOR: u8 = b'\n';
