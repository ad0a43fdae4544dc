use crate::error::ConfigError;
use crate::observers::ThresholdBounds;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of rows kept in the time-series buffer
pub const DEFAULT_MAX_POINTS: usize = 10_000;

/// Top-level daemon configuration
///
/// Every section is optional in the TOML file and falls back to its
/// defaults. The struct is passed explicitly to the monitor at startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub scheduler: SchedulerConfig,
    pub alerts: AlertsConfig,
    pub csv: Option<CsvConfig>,
    pub feeds: Vec<FeedConfig>,
}

/// `[monitor]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Maximum rows kept in memory
    pub max_points: usize,
    /// Resampling bucket width; absent disables resampling
    pub resample_seconds: Option<f64>,
    /// Drop rows older than this relative to the newest row
    pub retention_seconds: Option<u64>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_points: DEFAULT_MAX_POINTS,
            resample_seconds: None,
            retention_seconds: None,
        }
    }
}

impl MonitorConfig {
    /// Resampling bucket width, if a valid one is configured
    pub fn resample_width(&self) -> Option<Duration> {
        self.resample_seconds
            .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
            .filter(|width| !width.is_zero())
    }

    pub fn retention(&self) -> Option<chrono::Duration> {
        self.retention_seconds
            .and_then(|seconds| i64::try_from(seconds).ok())
            .and_then(chrono::Duration::try_seconds)
    }
}

/// `[scheduler]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub period_seconds: Option<f64>,
}

impl SchedulerConfig {
    pub fn period(&self) -> Option<Duration> {
        self.period_seconds
            .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
            .filter(|period| !period.is_zero())
    }
}

/// `[alerts]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// When set, alert channels are wrapped in a rate limiter
    pub rate_limit_per_minute: Option<usize>,
}

/// `[csv]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvConfig {
    pub path: PathBuf,
}

/// One `[[feeds]]` entry: a passive TCP feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub name: String,
    /// `host:port` of the newline-delimited JSON feed
    pub address: String,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl FeedConfig {
    pub fn bounds(&self) -> Result<ThresholdBounds, ConfigError> {
        ThresholdBounds::new(self.lower, self.upper)
            .map_err(|e| ConfigError::ValidationError(format!("feed '{}': {}", self.name, e)))
    }
}

impl Config {
    /// Load and validate a configuration file
    ///
    /// # Errors
    ///
    /// * `ConfigError::ReadError` - the file cannot be read
    /// * `ConfigError::ParseError` - the file is not valid TOML for this schema
    /// * `ConfigError::ValidationError` - a value is out of range
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!("Reading configuration from {}", path.display());
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor.max_points == 0 {
            return Err(ConfigError::ValidationError(
                "monitor.max_points must be greater than 0".to_string(),
            ));
        }

        if let Some(seconds) = self.monitor.resample_seconds {
            if !(seconds.is_finite() && seconds > 0.0) {
                return Err(ConfigError::ValidationError(format!(
                    "monitor.resample_seconds must be positive, got {}",
                    seconds
                )));
            }
        }

        if self.monitor.retention_seconds == Some(0) {
            return Err(ConfigError::ValidationError(
                "monitor.retention_seconds must be greater than 0".to_string(),
            ));
        }

        if let Some(seconds) = self.scheduler.period_seconds {
            if !(seconds.is_finite() && seconds > 0.0) {
                return Err(ConfigError::ValidationError(format!(
                    "scheduler.period_seconds must be positive, got {}",
                    seconds
                )));
            }
        }

        if self.alerts.rate_limit_per_minute == Some(0) {
            return Err(ConfigError::ValidationError(
                "alerts.rate_limit_per_minute must be greater than 0".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for feed in &self.feeds {
            if feed.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "feed name must not be empty".to_string(),
                ));
            }
            if !seen.insert(feed.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate feed name '{}'",
                    feed.name
                )));
            }
            feed.bounds()?;
        }

        Ok(())
    }
}
