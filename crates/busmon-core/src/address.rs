//! Bus scopes and address helpers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Which bus a session attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusScope {
    /// The per-login-session bus.
    #[default]
    Session,
    /// The system-wide bus.
    System,
}

impl BusScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::System => "system",
        }
    }
}

impl fmt::Display for BusScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BusScope {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "session" => Ok(Self::Session),
            "system" => Ok(Self::System),
            other => Err(DomainError::InvalidFieldValue {
                field: "bus scope".to_string(),
                value: other.to_string(),
                expected: "session or system".to_string(),
            }),
        }
    }
}

/// Returns true for unique connection addresses (`:1.42`), false for
/// well-known names (`org.freedesktop.Notifications`).
pub fn is_numeric_address(name: &str) -> bool {
    name.starts_with(':')
}
