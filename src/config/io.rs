//! Configuration file I/O operations

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use fs2::FileExt;

use super::Config;

/// Default configuration content for `questhook init`
pub const DEFAULT_CONFIG: &str = r#"# Questhook Configuration
# =======================
#
# Hook events from your coding agent are turned into XP, levels, streaks
# and quests. Every key below is optional; the values shown are the defaults.

# ============================================================================
# SERVER - HTTP API the hook client posts to
# ============================================================================
[server]
host = "127.0.0.1"
port = 8787
# Threads handling requests
workers = 4
# Requests with a larger body are rejected with 413
max_body_bytes = 262144
# Browser origins allowed to read profiles and the leaderboard
cors_origins = ["http://localhost:3000"]

# ============================================================================
# STORAGE - SQLite database
# ============================================================================
[storage]
# Database file (default: ~/.questhook/questhook.db)
# path = "/var/lib/questhook/questhook.db"
# How long a request waits on a locked database before failing
busy_timeout_ms = 5000

# ============================================================================
# REWARDS - XP policy
# ============================================================================
[rewards]
# Commits per UTC day that still earn XP (later commits are still counted)
daily_commit_xp_cap = 10
install_bonus = 25
first_session_bonus = 10
# Paid when a session ends on a day with at least one commit
session_commit_bonus = 20
# Longer sessions are credited with this many minutes
max_session_minutes = 480

# ============================================================================
# RATE LIMITS - requests per minute per client address (0 disables)
# ============================================================================
[rate_limit]
register_per_minute = 10
events_per_minute = 60
"#;

impl Config {
    /// Get the global config directory path (~/.questhook/)
    pub fn global_config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".questhook")
    }

    /// Get the global config file path (~/.questhook/config.toml)
    pub fn global_config_path() -> PathBuf {
        Self::global_config_dir().join("config.toml")
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Create a config with sensible defaults
    pub fn with_defaults() -> Self {
        Self::default()
    }

    /// Load configuration for a working directory.
    ///
    /// Looks for `.questhook/config.toml` in `dir`, then the global config,
    /// then falls back to defaults.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let project = dir.join(".questhook/config.toml");
        if project.exists() {
            return Self::from_file(&project);
        }

        let global = Self::global_config_path();
        if global.exists() {
            return Self::from_file(&global);
        }

        tracing::debug!("No config at {}, using defaults", global.display());
        Ok(Self::with_defaults())
    }

    /// Resolve the configuration for a command. An explicit path must exist;
    /// otherwise the current directory is searched via [`Config::from_dir`].
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        Self::from_dir(&cwd)
    }

    /// Database path, honoring `storage.path`
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| Self::global_config_dir().join("questhook.db"))
    }

    /// Write the commented default configuration to `path`.
    ///
    /// Writes under an exclusive lock file and renames a temp file into place.
    pub fn write_default(path: &Path, force: bool) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let lock_path = path.with_extension("toml.lock");
        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to create lock file: {}", lock_path.display()))?;

        lock_file
            .lock_exclusive()
            .with_context(|| "Failed to acquire config lock")?;

        // Re-check under the lock
        if path.exists() && !force {
            bail!(
                "Configuration already exists: {}\nUse --force to overwrite.",
                path.display()
            );
        }

        let temp_path = path.with_extension("toml.tmp");
        let mut temp_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

        temp_file
            .write_all(DEFAULT_CONFIG.as_bytes())
            .with_context(|| "Failed to write config content")?;

        temp_file
            .sync_all()
            .with_context(|| "Failed to sync config file")?;

        std::fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to rename config file: {}", path.display()))?;

        // Lock is released when lock_file is dropped
        Ok(())
    }
}
