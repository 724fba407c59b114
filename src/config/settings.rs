//! Settings sections of `config.toml`

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Address to bind (default: 127.0.0.1)
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on (default: 8787)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Largest accepted request body in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Origins allowed to call the API from a browser
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_workers() -> usize {
    4
}

fn default_max_body_bytes() -> usize {
    256 * 1024
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: default_workers(),
            max_body_bytes: default_max_body_bytes(),
            cors_origins: default_cors_origins(),
        }
    }
}

impl ServerSettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Database file. Empty means `~/.questhook/questhook.db`.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// How long a storage call waits on a locked database
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl StorageSettings {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Reward policy knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSettings {
    /// Commits per UTC day that still earn XP
    #[serde(default = "default_daily_commit_xp_cap")]
    pub daily_commit_xp_cap: u32,

    /// XP granted on registration
    #[serde(default = "default_install_bonus")]
    pub install_bonus: i64,

    /// One-time XP for the first session ever
    #[serde(default = "default_first_session_bonus")]
    pub first_session_bonus: i64,

    /// XP for ending a session on a day with at least one commit
    #[serde(default = "default_session_commit_bonus")]
    pub session_commit_bonus: i64,

    /// Upper bound on the minutes credited for a single session
    #[serde(default = "default_max_session_minutes")]
    pub max_session_minutes: i64,
}

fn default_daily_commit_xp_cap() -> u32 {
    10
}

fn default_install_bonus() -> i64 {
    25
}

fn default_first_session_bonus() -> i64 {
    10
}

fn default_session_commit_bonus() -> i64 {
    20
}

fn default_max_session_minutes() -> i64 {
    480
}

impl Default for RewardSettings {
    fn default() -> Self {
        Self {
            daily_commit_xp_cap: default_daily_commit_xp_cap(),
            install_bonus: default_install_bonus(),
            first_session_bonus: default_first_session_bonus(),
            session_commit_bonus: default_session_commit_bonus(),
            max_session_minutes: default_max_session_minutes(),
        }
    }
}

/// Per-client request limits (requests per minute, 0 disables)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_register_per_minute")]
    pub register_per_minute: u32,

    #[serde(default = "default_events_per_minute")]
    pub events_per_minute: u32,
}

fn default_register_per_minute() -> u32 {
    10
}

fn default_events_per_minute() -> u32 {
    60
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            register_per_minute: default_register_per_minute(),
            events_per_minute: default_events_per_minute(),
        }
    }
}
