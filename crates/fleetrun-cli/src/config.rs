//! Configuration loading and types

use std::path::{Path, PathBuf};
use std::time::Duration;

use fleetrun_exec::SshConfig;
use serde::{Deserialize, Serialize};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "FLEETRUN_CONFIG";

/// Top-level configuration for fleetrun
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
    /// SSH client settings
    #[serde(default)]
    pub ssh: SshConfig,
    /// Per-call defaults, overridden by flags
    #[serde(default)]
    pub defaults: Defaults,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of text
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Per-call defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    /// Timeout in seconds, 0 for none
    #[serde(default)]
    pub timeout_secs: u64,
    /// Remote retries after a failed attempt
    #[serde(default)]
    pub retry: u32,
    /// Pause before each retry, in seconds
    #[serde(default = "default_sleep_secs")]
    pub sleep_secs: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout_secs: 0,
            retry: 0,
            sleep_secs: default_sleep_secs(),
        }
    }
}

fn default_sleep_secs() -> u64 {
    10
}

impl Defaults {
    /// Default timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Default retry pause
    #[must_use]
    pub fn sleep(&self) -> Duration {
        Duration::from_secs(self.sleep_secs)
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from the explicit path, the environment, default paths, or use defaults
    ///
    /// Also returns the file that was read, `None` when defaults were used.
    ///
    /// # Errors
    /// Returns error if a config file was found but cannot be read or parsed
    pub fn load_default(explicit: Option<&Path>) -> eyre::Result<(Self, Option<PathBuf>)> {
        let chosen = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => std::env::var_os(CONFIG_ENV)
                .map(PathBuf::from)
                .or_else(Self::find_default),
        };

        match chosen {
            Some(path) => Ok((Self::load(&path)?, Some(path))),
            None => Ok((Config::default(), None)),
        }
    }

    fn find_default() -> Option<PathBuf> {
        [
            Some(PathBuf::from("fleetrun.toml")),
            Some(PathBuf::from("/etc/fleetrun/fleetrun.toml")),
            dirs::config_dir().map(|p| p.join("fleetrun/fleetrun.toml")),
        ]
        .into_iter()
        .flatten()
        .find(|path| path.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.ssh.program, "ssh");
        assert!(config.ssh.strict_host_key_checking);
        assert!(!config.ssh.forward_agent);
        assert_eq!(config.defaults.sleep(), Duration::from_secs(10));
        assert_eq!(config.defaults.timeout(), Duration::ZERO);
    }

    #[test]
    fn test_full_config() {
        let config: Config = toml::from_str(
            r#"
            [logging]
            level = "debug"
            json = true

            [ssh]
            program = "/usr/local/bin/ssh"
            options = ["-p", "2222"]
            strict_host_key_checking = false
            forward_agent = true

            [defaults]
            timeout_secs = 30
            retry = 2
            sleep_secs = 5
            "#,
        )
        .unwrap();

        assert!(config.logging.json);
        assert_eq!(config.ssh.options, ["-p", "2222"]);
        assert!(!config.ssh.strict_host_key_checking);
        assert_eq!(config.defaults.retry, 2);
        assert_eq!(config.defaults.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleetrun.toml");
        std::fs::write(&path, "[defaults]\nretry = 4\n").unwrap();

        let (config, source) = Config::load_default(Some(&path)).unwrap();

        assert_eq!(config.defaults.retry, 4);
        assert_eq!(source, Some(path));
    }

    #[test]
    fn test_explicit_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();

        assert!(Config::load_default(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_load_rejects_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleetrun.toml");
        std::fs::write(&path, "[defaults\n").unwrap();

        assert!(Config::load(&path).is_err());
    }
}
