/// TOML configuration for the daemon
pub mod config;

pub use config::{
    AlertsConfig, Config, CsvConfig, FeedConfig, MonitorConfig, SchedulerConfig,
    DEFAULT_MAX_POINTS,
};
