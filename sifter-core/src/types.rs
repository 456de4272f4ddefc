//! Domain types for the sifter registry.
//!
//! A [`Sifter`] is identified by its [`SifterId`] for the lifetime of a session.
//! Everything except the `synced` flag is fixed at creation.

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Session-unique sifter identifier. Allocated by the registry, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SifterId(pub u64);

impl fmt::Display for SifterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SifterId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl From<u64> for SifterId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// A strongly-typed, human-readable sifter name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SifterName(pub String);

impl fmt::Display for SifterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for SifterName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SifterName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Whether the device has acknowledged a sifter's current definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Not yet transferred, or the last transfer did not reach it.
    #[default]
    Pending,
    /// Part of the batch currently being sent.
    InFlight,
    /// The device acknowledged receipt.
    Acknowledged,
}

impl SyncState {
    pub fn is_synced(self) -> bool {
        matches!(self, SyncState::Acknowledged)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Pending => write!(f, "pending"),
            SyncState::InFlight => write!(f, "in_flight"),
            SyncState::Acknowledged => write!(f, "acknowledged"),
        }
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// One user-defined rule plus its device sync state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sifter {
    pub id: SifterId,
    pub name: SifterName,
    /// Rule definition, forwarded to the device verbatim.
    pub rule: String,
    #[serde(default)]
    pub synced: SyncState,
    pub created_at: DateTime<Utc>,
}

impl Sifter {
    /// A fresh, not-yet-transferred sifter.
    pub fn new(id: SifterId, name: impl Into<SifterName>, rule: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            rule: rule.into(),
            synced: SyncState::Pending,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_display() {
        assert_eq!(SifterId(7).to_string(), "7");
        assert_eq!(SifterName::from("errors").to_string(), "errors");
    }

    #[test]
    fn sifter_id_parses_trimmed_input() {
        assert_eq!(" 42\n".parse::<SifterId>().expect("parse"), SifterId(42));
        assert!("abc".parse::<SifterId>().is_err());
    }

    #[test]
    fn new_sifter_starts_pending() {
        let sifter = Sifter::new(SifterId(1), "errors", "level=error");
        assert_eq!(sifter.synced, SyncState::Pending);
        assert!(!sifter.synced.is_synced());
        assert_eq!(sifter.rule, "level=error");
    }

    #[test]
    fn sync_state_serializes_snake_case() {
        let yaml = serde_yaml::to_string(&SyncState::InFlight).expect("serialize");
        assert_eq!(yaml.trim(), "in_flight");
        assert_eq!(SyncState::Acknowledged.to_string(), "acknowledged");
    }
}
