//! Device identity
//!
//! A device is the only tenant. Its id doubles as the bearer credential the
//! hook client sends with every event.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque 128-bit device identifier, stored as a lowercase hyphenated UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("device id must be a UUID, got {0:?}")]
pub struct DeviceIdError(pub String);

impl DeviceId {
    /// Parse a device id from user input (registration body or bearer token).
    pub fn parse(raw: &str) -> Result<Self, DeviceIdError> {
        Uuid::parse_str(raw.trim())
            .map(|uuid| Self(uuid.hyphenated().to_string()))
            .map_err(|_| DeviceIdError(raw.to_string()))
    }

    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().hyphenated().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DeviceId {
    type Error = DeviceIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

/// A registered device (one player)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub character_name: String,
    pub created_at: DateTime<Utc>,
    pub show_on_leaderboard: bool,
}

impl Device {
    pub fn new(id: DeviceId, character_name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            character_name: character_name.into(),
            created_at,
            show_on_leaderboard: true,
        }
    }
}
