//! Callsign and grid locator normalization
//!
//! Callsigns are case-insensitive keys: every callsign entering the system is
//! trimmed and upper-cased before it is compared or stored. Grid locators are
//! treated as opaque cell identifiers; only their shape is checked.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Longest callsign accepted, including compound forms like "VP2E/G4ABC/P"
const MAX_CALLSIGN_LEN: usize = 15;

/// Shortest callsign accepted ("W1AW" is four, "G4A" would be three)
const MIN_CALLSIGN_LEN: usize = 3;

/// Longest grid accepted (10-character extended Maidenhead)
const MAX_GRID_LEN: usize = 10;

/// Station callsign, normalized to upper case
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Callsign(String);

impl Callsign {
    /// Parse and normalize a callsign
    ///
    /// Accepts an optional pair of angle brackets (hashed compound callsigns
    /// are logged as `<W7UUU>`). The result must contain at least one letter
    /// and one digit and only ASCII alphanumerics or `/`.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let trimmed = trimmed
            .strip_prefix('<')
            .and_then(|s| s.strip_suffix('>'))
            .unwrap_or(trimmed);
        let call = trimmed.to_ascii_uppercase();

        if call.len() < MIN_CALLSIGN_LEN || call.len() > MAX_CALLSIGN_LEN {
            return Err(Error::InvalidInput(format!(
                "callsign '{}' must be {}-{} characters",
                raw.trim(),
                MIN_CALLSIGN_LEN,
                MAX_CALLSIGN_LEN
            )));
        }

        let has_digit = call.chars().any(|c| c.is_ascii_digit());
        let has_letter = call.chars().any(|c| c.is_ascii_alphabetic());
        let all_valid = call.chars().all(|c| c.is_ascii_alphanumeric() || c == '/');

        if !(has_digit && has_letter && all_valid) {
            return Err(Error::InvalidInput(format!(
                "'{}' is not a valid callsign",
                raw.trim()
            )));
        }

        Ok(Self(call))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Callsign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Callsign {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Callsign {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Callsign> for String {
    fn from(value: Callsign) -> Self {
        value.0
    }
}

/// Grid locator (opaque, upper-cased)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Grid(String);

impl Grid {
    /// Parse a grid locator
    ///
    /// Only the shape is validated: 2-10 ASCII alphanumerics.
    pub fn parse(raw: &str) -> Result<Self> {
        let grid = raw.trim().to_ascii_uppercase();
        if grid.len() < 2 || grid.len() > MAX_GRID_LEN {
            return Err(Error::InvalidInput(format!(
                "grid '{}' must be 2-{} characters",
                raw.trim(),
                MAX_GRID_LEN
            )));
        }
        if !grid.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::InvalidInput(format!("'{}' is not a valid grid", raw.trim())));
        }
        Ok(Self(grid))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Grid {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Grid> for String {
    fn from(value: Grid) -> Self {
        value.0
    }
}
