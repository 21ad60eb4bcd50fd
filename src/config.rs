//! Configuration types for the check lifecycle engine.

use crate::checks::StatusWindows;
use crate::error::{Result, RoundsError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Upper bound for every configured delay (one hour).
const MAX_DELAY_MS: u64 = 3_600_000;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundsConfig {
    /// Timing window thresholds for status derivation.
    pub status: StatusWindows,
    /// Two-phase completion timing.
    pub choreography: ChoreographyConfig,
    /// Connection state machine timing.
    pub connection: ConnectionConfig,
    /// Runtime clock settings.
    pub runtime: RuntimeConfig,
    /// Seed fixture source.
    pub fixture: FixtureConfig,
}

/// Delays between the completing hold and the committed completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChoreographyConfig {
    /// Hold after `SetCompleting` before the check leaves the live list.
    pub hold_ms: u64,
    /// Further delay after the hold before `Complete` is issued.
    pub commit_after_hold_ms: u64,
}

impl Default for ChoreographyConfig {
    fn default() -> Self {
        Self {
            hold_ms: 1200,
            commit_after_hold_ms: 400,
        }
    }
}

/// Connection state machine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// How long `connected` / `synced` are shown before returning to `online`.
    pub settle_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self { settle_ms: 2000 }
    }
}

/// Runtime loop settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Interval between lifecycle sweeps.
    pub tick_interval_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
        }
    }
}

/// Where the seed fixture comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureConfig {
    /// JSON fixture file. `None` uses the built-in demo unit.
    pub path: Option<PathBuf>,
}

impl RoundsConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| RoundsError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| RoundsError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`RoundsError::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if !self.status.is_ordered() {
            return Err(RoundsError::Config(
                "status thresholds must be strictly increasing".to_owned(),
            ));
        }
        let delays = [
            ("choreography.hold_ms", self.choreography.hold_ms),
            (
                "choreography.commit_after_hold_ms",
                self.choreography.commit_after_hold_ms,
            ),
            ("connection.settle_ms", self.connection.settle_ms),
            ("runtime.tick_interval_ms", self.runtime.tick_interval_ms),
        ];
        for (name, ms) in delays {
            if ms > MAX_DELAY_MS {
                return Err(RoundsError::Config(format!(
                    "{name} must be <= {MAX_DELAY_MS}, got {ms}"
                )));
            }
        }
        if self.runtime.tick_interval_ms == 0 {
            return Err(RoundsError::Config(
                "runtime.tick_interval_ms must be > 0".to_owned(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path: `~/.config/rounds/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("rounds").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("rounds")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/rounds-config/config.toml")
        }
    }
}
