//! Protocol commands
//!
//! Outbound command lines and the fixed queries of the GRBL dialect.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ProtocolError;

/// Realtime status report request
pub const STATUS_POLL: &str = "?";

/// Build info request, answered with a `[VER:...]` telegram
pub const VERSION_QUERY: &str = "$I";

/// Settings dump request, answered with `$n=value` lines
pub const PARAM_LIST_QUERY: &str = "$$";

/// A motion axis of the bench
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// Lateral
    X,
    /// Vertical
    Y,
    /// Focus travel
    Z,
    /// Rotary
    A,
}

impl Axis {
    /// All axes in telegram order
    pub const ALL: [Axis; 4] = [Axis::X, Axis::Y, Axis::Z, Axis::A];

    /// Position of this axis in `MPos` and limit arrays
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
            Axis::A => 3,
        }
    }

    /// The G-code word letter
    pub fn letter(self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
            Axis::A => 'A',
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Why a command was queued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandTag {
    /// `?` status report request
    StatusPoll,
    /// `$I` build info request
    VersionQuery,
    /// `$$` settings dump
    ParamQuery,
    /// Anything that may occupy a slot in the controller's block buffer
    UserMotion,
    /// Operator-issued query that does not move anything
    UserQuery,
}

impl CommandTag {
    /// Whether this command may skip the block-buffer gate.
    ///
    /// Only engine queries qualify; they never occupy a planner slot.
    pub fn bypasses_buffer_gate(self) -> bool {
        matches!(
            self,
            CommandTag::StatusPoll | CommandTag::VersionQuery | CommandTag::ParamQuery
        )
    }
}

/// A single line bound for the controller, without its terminator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundCommand {
    line: String,
    tag: CommandTag,
}

impl OutboundCommand {
    /// Create a command; the line must be non-empty and contain no line breaks.
    ///
    /// A single trailing `\n` (or `\r\n`) is tolerated and stripped.
    pub fn new(line: impl Into<String>, tag: CommandTag) -> Result<Self, ProtocolError> {
        let mut line = line.into();
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        if line.trim().is_empty() || line.contains(['\n', '\r']) {
            return Err(ProtocolError::InvalidCommand(line));
        }
        Ok(Self { line, tag })
    }

    /// Status report request
    pub fn status_poll() -> Self {
        Self {
            line: STATUS_POLL.to_string(),
            tag: CommandTag::StatusPoll,
        }
    }

    /// Build info request
    pub fn version_query() -> Self {
        Self {
            line: VERSION_QUERY.to_string(),
            tag: CommandTag::VersionQuery,
        }
    }

    /// Settings dump request
    pub fn param_list_query() -> Self {
        Self {
            line: PARAM_LIST_QUERY.to_string(),
            tag: CommandTag::ParamQuery,
        }
    }

    /// Operator command that may move an axis
    pub fn motion(line: impl Into<String>) -> Result<Self, ProtocolError> {
        Self::new(line, CommandTag::UserMotion)
    }

    /// Line text without terminator
    pub fn line(&self) -> &str {
        &self.line
    }

    /// Why the command was queued
    pub fn tag(&self) -> CommandTag {
        self.tag
    }
}

/// Query line the controller answers with a status telegram
pub fn format_status_poll() -> &'static str {
    STATUS_POLL
}

/// Query line the controller answers with a version telegram
pub fn format_version_query() -> &'static str {
    VERSION_QUERY
}
