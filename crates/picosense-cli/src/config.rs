//! Configuration file management.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use picosense_core::SessionConfig;
use serde::{Deserialize, Serialize};

use crate::cli::OutputFormat;

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Number of relays on the board
    #[serde(default)]
    pub relay_count: Option<usize>,

    /// Default output format ("text" or "json")
    #[serde(default)]
    pub format: Option<String>,

    /// Log filter used when neither `RUST_LOG` nor a verbosity flag is set
    #[serde(default)]
    pub log_level: Option<String>,
}

impl Config {
    /// Get the config file path
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("picosense")
            .join("config.toml")
    }

    /// Load config from the default location, falling back to defaults
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    /// Load config from `path`, falling back to defaults
    ///
    /// Runs before tracing is installed, so problems go to stderr.
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        eprintln!("Warning: Failed to parse config: {}", e);
                    }
                },
                Err(e) => {
                    eprintln!("Warning: Failed to read config: {}", e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path())
    }

    /// Save config to `path` as pretty TOML
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Relay count from the flag, then the file, then the session default.
    pub fn resolve_relay_count(&self, flag: Option<usize>) -> usize {
        flag.or(self.relay_count)
            .unwrap_or_else(|| SessionConfig::default().relay_count)
    }

    /// Output format from the flag, then the file, then text.
    ///
    /// An unknown name in the file is ignored with a warning.
    pub fn resolve_format(&self, flag: Option<OutputFormat>) -> OutputFormat {
        if let Some(format) = flag {
            return format;
        }
        match self.format.as_deref() {
            Some(name) => OutputFormat::from_name(name).unwrap_or_else(|| {
                tracing::warn!("Unknown format '{}' in config, using text", name);
                OutputFormat::Text
            }),
            None => OutputFormat::default(),
        }
    }

    /// Session configuration for the resolved relay count.
    pub fn session_config(&self, relay_count_flag: Option<usize>) -> Result<SessionConfig> {
        let config = SessionConfig::default().relay_count(self.resolve_relay_count(relay_count_flag));
        config.validate().context("Invalid session configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relay_count_prefers_flag() {
        let config = Config {
            relay_count: Some(4),
            ..Default::default()
        };
        assert_eq!(config.resolve_relay_count(Some(8)), 8);
        assert_eq!(config.resolve_relay_count(None), 4);
    }

    #[test]
    fn test_resolve_relay_count_defaults_to_two() {
        assert_eq!(Config::default().resolve_relay_count(None), 2);
    }

    #[test]
    fn test_resolve_format() {
        let config = Config {
            format: Some("json".to_string()),
            ..Default::default()
        };
        assert_eq!(config.resolve_format(None), OutputFormat::Json);
        assert_eq!(
            config.resolve_format(Some(OutputFormat::Text)),
            OutputFormat::Text
        );

        let unknown = Config {
            format: Some("yaml".to_string()),
            ..Default::default()
        };
        assert_eq!(unknown.resolve_format(None), OutputFormat::Text);
    }

    #[test]
    fn test_session_config_rejects_zero_relays() {
        assert!(Config::default().session_config(Some(0)).is_err());
        assert_eq!(
            Config::default().session_config(Some(16)).unwrap().relay_count,
            16
        );
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config {
            relay_count: Some(6),
            format: Some("json".to_string()),
            log_level: Some("debug".to_string()),
        };

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path), config);
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            Config::load_from(&dir.path().join("absent.toml")),
            Config::default()
        );
    }

    #[test]
    fn test_load_invalid_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "relay_count = \"many\"").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
    }

    #[test]
    fn test_partial_file_parses() {
        let config: Config = toml::from_str("log_level = \"warn\"").unwrap();
        assert_eq!(config.log_level.as_deref(), Some("warn"));
        assert_eq!(config.relay_count, None);
    }
}
