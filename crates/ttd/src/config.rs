// TTD - Time-Travel Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Configuration for the TTD command line
//!
//! Settings are read from `--config <file>` when given, otherwise from
//! `~/.ttd.toml` if it exists, otherwise the defaults apply.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, Level};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Session behaviour
    pub session: SessionConfig,
    /// Logging output
    pub logging: LoggingConfig,
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long to wait for a control command to settle
    pub command_timeout_ms: u64,
    /// Maximum number of control commands a single run may issue
    pub max_steps: usize,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write logs to a rolling file under the temp directory
    pub file_logging: bool,
    /// Default level when `RUST_LOG` is not set
    pub level: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { command_timeout_ms: 5_000, max_steps: 10_000 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { file_logging: false, level: "warn".to_string() }
    }
}

impl Config {
    /// Get the config file path (~/.ttd.toml)
    pub fn config_path() -> Result<PathBuf> {
        let home =
            dirs::home_dir().ok_or_else(|| eyre::eyre!("Unable to determine home directory"))?;
        Ok(home.join(".ttd.toml"))
    }

    /// Load configuration from `explicit`, or from the default location
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        match Self::config_path() {
            Ok(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from a file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;
        config.log_level()?;

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).with_context(|| "Failed to serialize config to TOML")
    }

    /// Bound on the time a control command may take to settle
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.session.command_timeout_ms)
    }

    /// Parsed default log level
    pub fn log_level(&self) -> Result<Level> {
        self.logging
            .level
            .parse()
            .map_err(|_| eyre::eyre!("Invalid log level '{}'", self.logging.level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.command_timeout(), Duration::from_secs(5));
        assert_eq!(config.log_level().unwrap(), Level::WARN);
        assert!(!config.logging.file_logging);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ttd.toml");
        fs::write(&path, "[session]\ncommand_timeout_ms = 250\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.session.command_timeout_ms, 250);
        assert_eq!(config.session.max_steps, SessionConfig::default().max_steps);
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_invalid_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ttd.toml");

        fs::write(&path, "[logging]\nlevel = \"loud\"\n").unwrap();
        assert!(Config::load_from(&path).is_err());

        fs::write(&path, "session = 3").unwrap();
        assert!(Config::load_from(&path).is_err());

        assert!(Config::load_from(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_toml_output_reloads() {
        let config = Config::default();
        let text = config.to_toml().unwrap();
        assert!(text.contains("[session]"));
        assert_eq!(toml::from_str::<Config>(&text).unwrap(), config);
    }
}
