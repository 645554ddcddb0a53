//! # LensBench Core Library
//!
//! Communication engine for a motorized optical lens test bench driven by a
//! GRBL-derived CNC controller.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Serial port enumeration and line-framed transport
//! - Status and version telegram decoding
//! - Command queueing with block-buffer flow control
//! - A dedicated worker thread publishing typed events
//! - Lens identification from controller build info
//!
//! ## Example
//!
//! ```rust,ignore
//! use lensbench_core::prelude::*;
//!
//! let (engine, mut events) = Engine::spawn(EngineConfig::default())?;
//! engine.connect(ConnectRequest::new("/dev/ttyUSB0", 115200, Duration::from_millis(100)))?;
//!
//! while let Some(event) = events.blocking_recv() {
//!     if event == EngineEvent::StateChanged(ConnectionState::Connected) {
//!         for cmd in gcode::discovery_sequence() {
//!             engine.enqueue(cmd)?;
//!         }
//!     }
//! }
//! ```

pub mod config;
pub mod gcode;
pub mod lens;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{ConnectRequest, EngineConfig};
    pub use crate::gcode::{self, CommandLines};
    pub use crate::lens::LensClass;
    pub use crate::protocol::{
        Axis, CommandTag, ConnectionState, Engine, EngineEvent, OutboundCommand, PortInfo,
        ProtocolError, StatusSnapshot, VersionInfo,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
