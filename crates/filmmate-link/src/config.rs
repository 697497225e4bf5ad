//! Configuration types for the FilmMate link
//!
//! The target name, timing constants, and payload layout live in one
//! immutable [`LinkConfig`] that is handed to the locator, negotiator, and
//! command loop. Durations are written as humantime strings (`"5s"`).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{LinkError, Result};

/// Advertised name of the tripod firmware
pub const DEFAULT_TARGET_NAME: &str = "FilmMate Tripod";

/// Delay between connecting and enumerating the GATT table
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(5);

/// Delay between two outbound commands
pub const DEFAULT_COMMAND_INTERVAL: Duration = Duration::from_secs(5);

/// Width of an outbound command payload in bytes
pub const COMMAND_WIDTH: usize = 4;

/// Smallest generated command value
pub const COMMAND_MIN: i64 = 0;

/// Largest generated command value
pub const COMMAND_MAX: i64 = 100;

/// Widest payload the codec can produce or decode without overflow
pub const MAX_WIDTH: usize = 8;

/// Main configuration for a controller session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Substring matched against advertised device names (case-sensitive)
    #[serde(default = "default_target_name")]
    pub target_name: String,

    /// Scan settings
    #[serde(default)]
    pub scan: ScanConfig,

    /// Wait after connecting before the service table is read
    #[serde(with = "humantime_serde", default = "default_settle_delay")]
    pub settle_delay: Duration,

    /// Command loop settings
    #[serde(default)]
    pub command: CommandConfig,
}

fn default_target_name() -> String {
    DEFAULT_TARGET_NAME.to_string()
}

fn default_settle_delay() -> Duration {
    DEFAULT_SETTLE_DELAY
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            target_name: default_target_name(),
            scan: ScanConfig::default(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            command: CommandConfig::default(),
        }
    }
}

impl LinkConfig {
    /// Load a configuration from a JSON file
    ///
    /// Missing fields fall back to their defaults. The result is validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: LinkConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the controller cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.target_name.is_empty() {
            return Err(LinkError::InvalidConfig(
                "target_name must not be empty".to_string(),
            ));
        }
        self.command.validate()
    }
}

/// Scan behavior configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Scan window; `None` defers to the transport's default window
    #[serde(with = "option_humantime_serde", default)]
    pub timeout: Option<Duration>,
}

/// Command loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Wait between two commands
    #[serde(with = "humantime_serde", default = "default_command_interval")]
    pub interval: Duration,

    /// Outbound payload width in bytes
    #[serde(default = "default_command_width")]
    pub width: usize,

    /// Smallest generated value (inclusive)
    #[serde(default = "default_command_min")]
    pub min: i64,

    /// Largest generated value (inclusive)
    #[serde(default = "default_command_max")]
    pub max: i64,

    /// Stop gracefully after this many commands (`None` = run until cancelled)
    #[serde(default)]
    pub max_commands: Option<u64>,
}

fn default_command_interval() -> Duration {
    DEFAULT_COMMAND_INTERVAL
}

fn default_command_width() -> usize {
    COMMAND_WIDTH
}

fn default_command_min() -> i64 {
    COMMAND_MIN
}

fn default_command_max() -> i64 {
    COMMAND_MAX
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_COMMAND_INTERVAL,
            width: COMMAND_WIDTH,
            min: COMMAND_MIN,
            max: COMMAND_MAX,
            max_commands: None,
        }
    }
}

impl CommandConfig {
    /// Check the loop settings: payload width, value range, interval, and
    /// command budget
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.width > MAX_WIDTH {
            return Err(LinkError::InvalidConfig(format!(
                "command width must be between 1 and {} bytes, got {}",
                MAX_WIDTH, self.width
            )));
        }
        if self.min > self.max {
            return Err(LinkError::InvalidConfig(format!(
                "command range is empty: min {} > max {}",
                self.min, self.max
            )));
        }
        if self.width < MAX_WIDTH {
            let bits = (self.width * 8) as u32;
            let lo = -(1i64 << (bits - 1));
            let hi = (1i64 << (bits - 1)) - 1;
            if self.min < lo || self.max > hi {
                return Err(LinkError::InvalidConfig(format!(
                    "command range [{}, {}] does not fit in {} bytes",
                    self.min, self.max, self.width
                )));
            }
        }
        if self.interval.is_zero() {
            return Err(LinkError::InvalidConfig(
                "command interval must be non-zero".to_string(),
            ));
        }
        if self.max_commands == Some(0) {
            return Err(LinkError::InvalidConfig(
                "max_commands must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for LinkConfig
#[derive(Debug, Default)]
pub struct LinkConfigBuilder {
    config: LinkConfig,
}

impl LinkConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn from_config(config: LinkConfig) -> Self {
        Self { config }
    }

    /// Set the target name substring
    pub fn target_name(mut self, name: impl Into<String>) -> Self {
        self.config.target_name = name.into();
        self
    }

    /// Set an explicit scan window
    pub fn scan_timeout(mut self, timeout: Duration) -> Self {
        self.config.scan.timeout = Some(timeout);
        self
    }

    /// Set the settle delay after connecting
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.config.settle_delay = delay;
        self
    }

    /// Set the interval between commands
    pub fn command_interval(mut self, interval: Duration) -> Self {
        self.config.command.interval = interval;
        self
    }

    /// Set the inclusive range of generated command values
    pub fn command_range(mut self, min: i64, max: i64) -> Self {
        self.config.command.min = min;
        self.config.command.max = max;
        self
    }

    /// Stop after a fixed number of commands
    pub fn max_commands(mut self, count: u64) -> Self {
        self.config.command.max_commands = Some(count);
        self
    }

    /// Build the configuration, validating it
    pub fn build(self) -> Result<LinkConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// Custom serde module for Duration with humantime
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

mod option_humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&humantime::format_duration(*d).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Option::<String>::deserialize(deserializer)?;
        s.map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
