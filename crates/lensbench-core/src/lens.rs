//! Lens identification
//!
//! The controller's build info carries identification tokens; the first three
//! characters of a token name the lens assembly wired to the bench.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Known lens assemblies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LensClass {
    /// Identified by a `JWF` token
    L084,
    /// Identified by an `LS8` token
    L085,
    /// Identified by a `6ZG` token
    L086,
}

impl LensClass {
    /// Code used as the key into per-lens settings
    pub fn code(self) -> &'static str {
        match self {
            LensClass::L084 => "L084",
            LensClass::L085 => "L085",
            LensClass::L086 => "L086",
        }
    }
}

impl fmt::Display for LensClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Token prefix -> lens assembly
const PREFIX_TABLE: &[(&str, LensClass)] = &[
    ("LS8", LensClass::L085),
    ("6ZG", LensClass::L086),
    ("JWF", LensClass::L084),
];

/// Match a single identification token against the prefix table
pub fn lens_for_token(token: &str) -> Option<LensClass> {
    let prefix = token.get(..3)?;
    PREFIX_TABLE
        .iter()
        .find(|(p, _)| *p == prefix)
        .map(|(_, class)| *class)
}

/// Lens assembly named by `tokens`; when several match, the last one wins
pub fn identify<S: AsRef<str>>(tokens: &[S]) -> Option<LensClass> {
    tokens.iter().filter_map(|t| lens_for_token(t.as_ref())).last()
}
