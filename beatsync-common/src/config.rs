//! Configuration loading and config file resolution
//!
//! Bootstrap configuration comes from a single TOML file. Every field has a
//! built-in default, so a missing file (or a missing section) is never fatal.
//!
//! # Config File Resolution
//!
//! 1. Command-line argument (highest priority)
//! 2. `BEATSYNC_CONFIG` environment variable
//! 3. `<platform config dir>/beatsync/config.toml`
//! 4. Built-in defaults (no file)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "BEATSYNC_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Music synchronization engine settings
    #[serde(default)]
    pub music: MusicConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Music synchronization settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicConfig {
    /// Upper bound on how long the music start thread sleeps between
    /// mailbox checks when no wakeup arrives
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Extra latency added to the driver's minimum start latency when
    /// aligning a new song. A freshly loaded sound starts slower than a
    /// precached one.
    #[serde(default = "default_presumed_latency_nudge_ms")]
    pub presumed_latency_nudge_ms: u64,

    /// Start music on the background thread (false: start inline on the caller)
    #[serde(default = "default_threaded_start")]
    pub threaded_start: bool,

    /// Event bus buffer size
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_poll_interval_ms() -> u64 {
    10
}

fn default_presumed_latency_nudge_ms() -> u64 {
    40
}

fn default_threaded_start() -> bool {
    true
}

fn default_event_capacity() -> usize {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for MusicConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            presumed_latency_nudge_ms: default_presumed_latency_nudge_ms(),
            threaded_start: default_threaded_start(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl MusicConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn presumed_latency_nudge_seconds(&self) -> f64 {
        self.presumed_latency_nudge_ms as f64 / 1000.0
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(1..=1000).contains(&self.poll_interval_ms) {
            return Err(Error::Config(format!(
                "music.poll_interval_ms must be 1-1000, got {}",
                self.poll_interval_ms
            )));
        }
        if self.presumed_latency_nudge_ms > 1000 {
            return Err(Error::Config(format!(
                "music.presumed_latency_nudge_ms must be at most 1000, got {}",
                self.presumed_latency_nudge_ms
            )));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config(
                "music.event_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl TomlConfig {
    /// Parse and validate TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: TomlConfig =
            toml::from_str(text).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        config.music.validate()?;
        Ok(config)
    }

    /// Load a config file that must exist
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Resolve and load the config file, falling back to defaults
    ///
    /// Returns the config and the file it came from (None for built-in
    /// defaults). A missing file only logs; an unreadable or malformed one is
    /// an error.
    pub fn load_or_default(cli_arg: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let explicit = cli_arg.is_some() || std::env::var_os(CONFIG_ENV_VAR).is_some();

        let Some(path) = resolve_config_path(cli_arg) else {
            debug!("No config directory available, using built-in defaults");
            return Ok((Self::default(), None));
        };

        if !path.exists() {
            if explicit {
                warn!(
                    "Config file {} not found, using built-in defaults",
                    path.display()
                );
            } else {
                debug!("No config file at {}, using built-in defaults", path.display());
            }
            return Ok((Self::default(), None));
        }

        let config = Self::load(&path)?;
        info!("Loaded configuration from {}", path.display());
        Ok((config, Some(path)))
    }
}

/// Pick the config file path by priority (CLI, environment, platform default)
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }

    // Priority 3: Platform config directory
    default_config_path()
}

/// `<config dir>/beatsync/config.toml`, e.g. `~/.config/beatsync/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("beatsync").join("config.toml"))
}
