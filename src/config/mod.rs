//! Configuration loading and management

mod io;
mod settings;

pub use io::DEFAULT_CONFIG;
pub use settings::{RateLimitSettings, RewardSettings, ServerSettings, StorageSettings};

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server
    #[serde(default)]
    pub server: ServerSettings,

    /// Database location and timeouts
    #[serde(default)]
    pub storage: StorageSettings,

    /// Reward policy
    #[serde(default)]
    pub rewards: RewardSettings,

    /// Request limits
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.rewards, RewardSettings::default());
        assert_eq!(config.rewards.daily_commit_xp_cap, 10);
        assert_eq!(config.rate_limit.events_per_minute, 60);
        assert_eq!(config.storage.path, None);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [rewards]
            daily_commit_xp_cap = 3

            [server]
            port = 9000
            "#,
        )
        .unwrap();
        assert_eq!(config.rewards.daily_commit_xp_cap, 3);
        assert_eq!(config.rewards.install_bonus, 25);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_default_config_template_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.rewards, RewardSettings::default());
        assert_eq!(config.server.bind_addr(), "127.0.0.1:8787");
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[rewards]\nsession_commit_bonus = 5\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.rewards.session_commit_bonus, 5);
        assert_eq!(config.server.workers, 4);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let dir = tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_from_dir_reads_project_config() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".questhook")).unwrap();
        std::fs::write(
            dir.path().join(".questhook/config.toml"),
            "[server]\nport = 9100\n",
        )
        .unwrap();
        let config = Config::from_dir(dir.path()).unwrap();
        assert_eq!(config.server.port, 9100);
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();
        let err = Config::from_file(&path).unwrap_err();
        assert!(format!("{err:#}").contains("config.toml"));
    }

    #[test]
    fn test_write_default_refuses_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");
        Config::write_default(&path, false).unwrap();
        assert!(path.exists());
        assert!(Config::write_default(&path, false).is_err());
        assert!(Config::write_default(&path, true).is_ok());
    }
}
