//! G-code builders
//!
//! Formats the handful of command lines an operator panel issues: jogs,
//! absolute moves, per-axis homing and the discovery sequence sent right
//! after a connection comes up.

use serde::{Deserialize, Serialize};

use crate::protocol::commands::{Axis, OutboundCommand};
use crate::protocol::ProtocolError;

fn finite(what: &str, value: f64) -> Result<f64, ProtocolError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ProtocolError::InvalidCommand(format!("{} is not a finite number", what)))
    }
}

/// Relative move of one axis: `G91 X-0.5 F200`
pub fn jog(axis: Axis, step: f64, feed: f64) -> Result<OutboundCommand, ProtocolError> {
    let step = finite("jog step", step)?;
    let feed = finite("feed rate", feed)?;
    OutboundCommand::motion(format!("G91 {}{} F{}", axis, step, feed))
}

/// Absolute move of the listed axes: `G90 X1 Y2.5 F200`
pub fn move_absolute(targets: &[(Axis, f64)], feed: f64) -> Result<OutboundCommand, ProtocolError> {
    if targets.is_empty() {
        return Err(ProtocolError::InvalidCommand(
            "absolute move without target axes".to_string(),
        ));
    }
    let feed = finite("feed rate", feed)?;
    let mut line = String::from("G90");
    for (axis, value) in targets {
        let value = finite("move target", *value)?;
        line.push_str(&format!(" {}{}", axis, value));
    }
    line.push_str(&format!(" F{}", feed));
    OutboundCommand::motion(line)
}

/// Home a single axis: `$HX`
pub fn home(axis: Axis) -> Result<OutboundCommand, ProtocolError> {
    OutboundCommand::motion(format!("$H{}", axis))
}

/// Queries to issue once a connection is up: status, build info, settings
pub fn discovery_sequence() -> Vec<OutboundCommand> {
    vec![
        OutboundCommand::status_poll(),
        OutboundCommand::version_query(),
        OutboundCommand::param_list_query(),
    ]
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

/// Command lines from a settings file.
///
/// Settings may give either one line or a list of lines; both deserialize
/// into the same sequence so callers only ever enqueue single lines.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "OneOrMany", into = "Vec<String>")]
pub struct CommandLines(Vec<String>);

impl From<OneOrMany> for CommandLines {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(line) => Self(vec![line]),
            OneOrMany::Many(lines) => Self(lines),
        }
    }
}

impl From<CommandLines> for Vec<String> {
    fn from(value: CommandLines) -> Self {
        value.0
    }
}

impl CommandLines {
    /// Wrap already split lines
    pub fn new(lines: Vec<String>) -> Self {
        Self(lines)
    }

    /// Lines in order
    pub fn lines(&self) -> &[String] {
        &self.0
    }

    /// No lines at all
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Validate every line as a gated user command
    pub fn to_commands(&self) -> Result<Vec<OutboundCommand>, ProtocolError> {
        self.0.iter().map(|l| OutboundCommand::motion(l.as_str())).collect()
    }
}
