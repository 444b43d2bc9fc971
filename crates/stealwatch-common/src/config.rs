//! Configuration structures for the monitor.
//!
//! [`MonitorConfig`] is the loose, file- and CLI-facing form with serde
//! defaults. [`MonitorConfig::validate`] turns it into the immutable
//! [`LoopConfig`] consumed by the measurement loop.

use crate::time::NS_PER_MSEC;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default maximum allowed scheduling gap in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 200;
/// Smallest accepted timeout in milliseconds.
pub const MIN_TIMEOUT_MS: u64 = 1;
/// Largest accepted timeout in milliseconds (one hour).
pub const MAX_TIMEOUT_MS: u64 = 3_600_000;
/// The loop waits `timeout / WAIT_BUDGET_DIVISOR` per iteration.
pub const WAIT_BUDGET_DIVISOR: u64 = 3;

/// Environment variable naming a configuration file.
pub const CONFIG_ENV_VAR: &str = "STEALWATCH_CONFIG";
/// System-wide configuration file location.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/stealwatch/config.toml";

/// Top-level monitor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Maximum allowed gap between two scheduled wakeups.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Steal percentage above which a missed wakeup is blamed on the host.
    /// Unset means the default of the active steal-time provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steal_threshold_percent: Option<f64>,

    /// Real-time configuration.
    pub realtime: RealtimeConfig,

    /// Logging and process-mode configuration.
    pub logging: LoggingConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            steal_threshold_percent: None,
            realtime: RealtimeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Real-time scheduling configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Request `SCHED_RR` at maximum priority.
    pub set_priority: bool,

    /// Lock all memory pages (mlockall).
    pub lock_memory: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            set_priority: true,
            lock_memory: true,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 0 = info, 1 = debug, 2 or more = trace.
    pub verbosity: u8,

    /// Detach from the terminal and log to syslog.
    pub daemonize: bool,
}

impl LoggingConfig {
    /// Filter directive level for the configured verbosity.
    #[must_use]
    pub fn level(&self) -> &'static str {
        match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Validated, immutable loop parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopConfig {
    timeout_ms: u64,
    steal_threshold_percent: Option<f64>,
    priority_elevation_enabled: bool,
}

impl LoopConfig {
    /// Build a loop configuration, checking value ranges.
    ///
    /// # Errors
    ///
    /// Returns an error if `timeout_ms` is outside
    /// [`MIN_TIMEOUT_MS`]..=[`MAX_TIMEOUT_MS`] or the threshold is not a
    /// finite positive number.
    pub fn new(
        timeout_ms: u64,
        steal_threshold_percent: Option<f64>,
        priority_elevation_enabled: bool,
    ) -> Result<Self, ConfigError> {
        if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&timeout_ms) {
            return Err(ConfigError::TimeoutOutOfRange { value_ms: timeout_ms });
        }
        if let Some(threshold) = steal_threshold_percent {
            if !threshold.is_finite() || threshold <= 0.0 {
                return Err(ConfigError::InvalidThreshold(threshold));
            }
        }
        Ok(Self {
            timeout_ms,
            steal_threshold_percent,
            priority_elevation_enabled,
        })
    }

    /// Maximum allowed gap in milliseconds.
    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// Maximum allowed gap in nanoseconds.
    #[must_use]
    pub fn timeout_ns(&self) -> u64 {
        self.timeout_ms * NS_PER_MSEC
    }

    /// Per-iteration wait budget in milliseconds.
    #[must_use]
    pub fn wait_budget_ms(&self) -> u64 {
        self.timeout_ms / WAIT_BUDGET_DIVISOR
    }

    /// User-supplied steal threshold, if any.
    #[must_use]
    pub fn steal_threshold_override(&self) -> Option<f64> {
        self.steal_threshold_percent
    }

    /// Effective steal threshold given a provider default.
    #[must_use]
    pub fn steal_threshold_or(&self, provider_default: f64) -> f64 {
        self.steal_threshold_percent.unwrap_or(provider_default)
    }

    /// Whether scheduler elevation was requested.
    #[must_use]
    pub fn priority_elevation_enabled(&self) -> bool {
        self.priority_elevation_enabled
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            steal_threshold_percent: None,
            priority_elevation_enabled: true,
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check ranges and produce the loop configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout is not a whole number of
    /// milliseconds, is out of range, or the threshold is invalid.
    pub fn validate(&self) -> Result<LoopConfig, ConfigError> {
        if self.timeout.subsec_nanos() % 1_000_000 != 0 {
            return Err(ConfigError::TimeoutNotWholeMillis(self.timeout));
        }
        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        LoopConfig::new(
            timeout_ms,
            self.steal_threshold_percent,
            self.realtime.set_priority,
        )
    }
}

/// Locate the configuration file to load.
///
/// Resolution priority (first match wins):
/// 1. `explicit` path (returned even if missing, so the read error surfaces)
/// 2. `env_value` (the [`CONFIG_ENV_VAR`] contents) if that file exists
/// 3. `system_path` if it exists
/// 4. `None`: use built-in defaults
#[must_use]
pub fn resolve_config_path(
    explicit: Option<&Path>,
    env_value: Option<&str>,
    system_path: &Path,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Some(env_path) = env_value {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Some(path);
        }
        tracing::warn!(
            path = %env_path,
            "{CONFIG_ENV_VAR} set but file does not exist, checking other locations"
        );
    }

    if system_path.exists() {
        return Some(system_path.to_path_buf());
    }

    None
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Timeout outside the accepted range.
    #[error(
        "timeout {value_ms}ms is invalid (allowed range {}..={}ms)",
        MIN_TIMEOUT_MS,
        MAX_TIMEOUT_MS
    )]
    TimeoutOutOfRange {
        /// Rejected timeout.
        value_ms: u64,
    },

    /// Timeout with sub-millisecond precision.
    #[error("timeout {0:?} is not a whole number of milliseconds")]
    TimeoutNotWholeMillis(Duration),

    /// Steal threshold that is not a finite positive percentage.
    #[error("steal threshold {0} is invalid (must be greater than 0)")]
    InvalidThreshold(f64),
}

/// Serde helper module for `Duration` using humantime format.
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
