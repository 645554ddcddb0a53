//! Telegram codec
//!
//! Pure decoding of the lines a GRBL-derived controller sends back. Nothing
//! here does I/O or keeps state; every function is total over arbitrary input.
//!
//! Status telegram: `<Idle|MPos:1.250,-2.000,0.000,10.500|Bf:15,128|Pn:XY>`
//!
//! Version telegram: `[VER:1.1f-SCE:L086,6ZG-BEG19]`

use serde::{Deserialize, Serialize};

use super::commands::Axis;
use super::DecodeError;
use crate::lens::{self, LensClass};

/// Absolute machine positions, indexed by [`Axis::index`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisPositions(pub [f64; 4]);

impl AxisPositions {
    /// Position of one axis
    pub fn get(&self, axis: Axis) -> f64 {
        self.0[axis.index()]
    }
}

/// Free capacity reported in a `Bf:` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferState {
    /// Free slots in the motion block buffer
    pub blocks: u32,
    /// Free bytes in the serial receive buffer
    pub rx_bytes: u32,
}

/// One decoded status telegram.
///
/// Fields the telegram did not carry are `None`; they are never filled in
/// with zeros or carried over from an earlier snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Machine state label, e.g. "Idle", "Run", "Hold:0"
    pub state: String,
    /// `MPos:` machine positions
    pub positions: Option<AxisPositions>,
    /// Limit switch flags, indexed by [`Axis::index`]
    pub limits: [bool; 4],
    /// `Bf:` buffer counts
    pub buffer: Option<BufferState>,
}

impl StatusSnapshot {
    /// Reported position of `axis`
    pub fn position(&self, axis: Axis) -> Option<f64> {
        self.positions.map(|p| p.get(axis))
    }

    /// Whether the limit switch of `axis` is tripped
    pub fn limit(&self, axis: Axis) -> bool {
        self.limits[axis.index()]
    }

    /// Free motion block slots
    pub fn block_buffer_avail(&self) -> Option<u32> {
        self.buffer.map(|b| b.blocks)
    }

    /// Free bytes in the serial receive buffer
    pub fn rx_buffer_avail(&self) -> Option<u32> {
        self.buffer.map(|b| b.rx_bytes)
    }
}

/// Decoded `[VER:...]` telegram
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    /// Firmware version, e.g. "1.1f-SCE"
    pub firmware: String,
    /// Identification tokens from the build info string
    pub ids: Vec<String>,
}

impl VersionInfo {
    /// Lens assembly named by the identification tokens, if any is known
    pub fn lens_class(&self) -> Option<LensClass> {
        lens::identify(&self.ids)
    }
}

/// Shape of a received line
#[derive(Debug, Clone, PartialEq)]
pub enum Telegram {
    /// `<...>` status report
    Status(StatusSnapshot),
    /// `[VER:...]` build info
    Version(VersionInfo),
    /// `ok` acknowledgement
    Ok,
    /// `error:N` rejection of the last command
    ControllerError(String),
    /// `ALARM:N`
    Alarm(String),
    /// `$n=value` settings line
    Setting {
        /// Setting number, e.g. `$110`
        key: String,
        /// Raw value text
        value: String,
    },
    /// Any other bracketed feedback (`[MSG:...]`, `[GC:...]`, ...)
    Message(String),
    /// Anything else, kept verbatim
    Unrecognized(String),
}

/// Classify and decode one received line.
///
/// A line that looks like a status or version telegram but fails to decode
/// is returned as the decode error so the caller can log and drop it.
pub fn classify_line(raw_line: &str) -> Result<Telegram, DecodeError> {
    let line = raw_line.trim();

    if line.starts_with('<') {
        return decode_status(line).map(Telegram::Status);
    }
    if line.starts_with("[VER:") {
        return decode_version(line).map(Telegram::Version);
    }
    if line.starts_with('[') && line.ends_with(']') {
        return Ok(Telegram::Message(line[1..line.len() - 1].to_string()));
    }
    if line == "ok" {
        return Ok(Telegram::Ok);
    }
    if let Some(code) = line.strip_prefix("error:") {
        return Ok(Telegram::ControllerError(code.to_string()));
    }
    if let Some(code) = line.strip_prefix("ALARM:") {
        return Ok(Telegram::Alarm(code.to_string()));
    }
    if let Some(rest) = line.strip_prefix('$') {
        if let Some((key, value)) = rest.split_once('=') {
            return Ok(Telegram::Setting {
                key: key.to_string(),
                value: value.to_string(),
            });
        }
    }

    Ok(Telegram::Unrecognized(line.to_string()))
}

fn invalid(tag: &'static str, value: &str) -> DecodeError {
    DecodeError::InvalidField {
        tag,
        value: value.to_string(),
    }
}

fn parse_buffer(value: &str) -> Result<BufferState, DecodeError> {
    let mut parts = value.split(',');
    let blocks = parts.next().and_then(|s| s.trim().parse::<u32>().ok());
    let rx_bytes = parts.next().and_then(|s| s.trim().parse::<u32>().ok());
    match (blocks, rx_bytes) {
        (Some(blocks), Some(rx_bytes)) => Ok(BufferState { blocks, rx_bytes }),
        _ => Err(invalid("Bf", value)),
    }
}

fn parse_positions(value: &str) -> Result<AxisPositions, DecodeError> {
    let values: Vec<f64> = value
        .split(',')
        .map(|s| s.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| invalid("MPos", value))?;

    let arr: [f64; 4] = values.try_into().map_err(|_| invalid("MPos", value))?;
    if arr.iter().any(|v| !v.is_finite()) {
        return Err(invalid("MPos", value));
    }
    Ok(AxisPositions(arr))
}

fn parse_limits(value: &str) -> [bool; 4] {
    let mut limits = [false; 4];
    for axis in Axis::ALL {
        limits[axis.index()] = value.contains(axis.letter());
    }
    limits
}

/// Decode a `<STATE|tag:value|...>` status telegram.
///
/// Unknown tags are skipped. `Pn:` is the only source of limit flags; a
/// telegram without it reports every limit as open.
pub fn decode_status(raw_line: &str) -> Result<StatusSnapshot, DecodeError> {
    let line = raw_line.trim();
    let body = line
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .ok_or_else(|| DecodeError::NotStatus(line.to_string()))?;

    let mut fields = body.split('|');
    let state = fields.next().unwrap_or_default().trim();
    if state.is_empty() {
        return Err(DecodeError::EmptyState);
    }

    let mut snapshot = StatusSnapshot {
        state: state.to_string(),
        positions: None,
        limits: [false; 4],
        buffer: None,
    };

    for field in fields {
        let Some((tag, value)) = field.split_once(':') else {
            continue;
        };
        match tag {
            "Bf" => snapshot.buffer = Some(parse_buffer(value)?),
            "Pn" => snapshot.limits = parse_limits(value),
            "MPos" => snapshot.positions = Some(parse_positions(value)?),
            _ => {}
        }
    }

    Ok(snapshot)
}

/// Decode a `[VER:<fw>:<id>,<id>,...]` telegram.
pub fn decode_version(raw_line: &str) -> Result<VersionInfo, DecodeError> {
    let line = raw_line.trim();
    let body = line
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| DecodeError::NotVersion(line.to_string()))?;

    let segments: Vec<&str> = body.split(':').collect();
    if segments.len() < 3 {
        return Err(DecodeError::TooFewSegments {
            found: segments.len(),
        });
    }

    let ids = segments[2]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    Ok(VersionInfo {
        firmware: segments[1].trim().to_string(),
        ids,
    })
}
