//! Type definitions and aliases

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Re-export commonly used types
pub use crate::error::{AppError, Result};

/// Transport-level outcome: success
pub const NET_CODE_OK: i32 = 0;
/// Transport-level outcome: generic transport failure sentinel
pub const NET_CODE_TRANSPORT_ERROR: i32 = 1;
/// Transport-level outcome: ETIMEDOUT
pub const NET_CODE_TIMED_OUT: i32 = 110;

/// Application-level outcome: success
pub const PROTO_CODE_OK: i32 = 200;
/// Application-level outcome: warning class
pub const PROTO_CODE_WARNING: i32 = 400;
/// Application-level outcome: failure
pub const PROTO_CODE_ERROR: i32 = 500;

/// Gun variants known to the factory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GunKind {
    /// Fixed-delay synthetic gun for pipeline smoke tests
    Log,
    /// HTTP GET gun
    Http,
    /// SQL statement gun
    Sql,
    /// Single-function script gun (deprecated in favour of `Ultimate`)
    Custom,
    /// Scenario-table script gun (deprecated in favour of `Ultimate`)
    Scenario,
    /// Class-based script gun
    Ultimate,
}

impl GunKind {
    /// All gun kinds, in display order
    pub const ALL: [GunKind; 6] = [
        GunKind::Log,
        GunKind::Http,
        GunKind::Sql,
        GunKind::Custom,
        GunKind::Scenario,
        GunKind::Ultimate,
    ];

    /// Short name used on the command line and in environment variables
    pub fn as_str(&self) -> &'static str {
        match self {
            GunKind::Log => "log",
            GunKind::Http => "http",
            GunKind::Sql => "sql",
            GunKind::Custom => "custom",
            GunKind::Scenario => "scenario",
            GunKind::Ultimate => "ultimate",
        }
    }

    /// Configuration section name of the gun
    pub fn section(&self) -> &'static str {
        match self {
            GunKind::Log => "log_gun",
            GunKind::Http => "http_gun",
            GunKind::Sql => "sql_gun",
            GunKind::Custom => "custom_gun",
            GunKind::Scenario => "scenario_gun",
            GunKind::Ultimate => "ultimate_gun",
        }
    }

    /// Whether the gun loads user code at setup
    pub fn is_dynamic(&self) -> bool {
        matches!(self, GunKind::Custom | GunKind::Scenario | GunKind::Ultimate)
    }
}

impl fmt::Display for GunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GunKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase();
        let normalized = normalized.strip_suffix("_gun").unwrap_or(&normalized);
        GunKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| AppError::config(format!("Unknown gun type: {}", s)))
    }
}

/// One unit of ammunition: what to send and how to label it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Missile {
    /// Input data for the shot (request path, SQL statement, script argument)
    pub payload: String,
    /// Label used for result tagging and scenario dispatch
    pub marker: String,
}

impl Missile {
    /// Create a new missile
    pub fn new<P: Into<String>, M: Into<String>>(payload: P, marker: M) -> Self {
        Self {
            payload: payload.into(),
            marker: marker.into(),
        }
    }

    /// Create a missile without a marker
    pub fn unmarked<P: Into<String>>(payload: P) -> Self {
        Self::new(payload, "")
    }
}

/// What a single `shoot` call ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fired {
    /// A measurement scope was closed and offered to the result channel
    Measured,
    /// Nothing was measured (no scenario matched the marker)
    Skipped,
}
