/// Error types for the monitoring core
pub mod error;

/// Timestamped samples and batches
pub mod sample;

/// Observers: threshold state, watchers, listeners and feeds
pub mod observers;

/// Resampling and the bounded time-series buffer
pub mod aggregator;

/// Periodic and triggered cycle scheduling
pub mod scheduler;

/// Consumers of new data
pub mod sinks;

/// Alert channels and rate limiting
pub mod alerts;

/// Monitor orchestrator
pub mod monitor;

/// Self-monitoring cycle statistics
pub mod stats;

/// Configuration management
pub mod config;

use log::warn;
use std::sync::{Mutex, MutexGuard};

// Re-export commonly used types
pub use error::{AlertError, ConfigError, FeedError, ObserverError, SchedulerError, SinkError};
pub use monitor::Monitor;
pub use observers::{Measurement, Measurer, Observer, ThresholdBounds};
pub use sample::{Batch, Sample, Timestamp};
pub use scheduler::Schedule;

/// Lock a mutex, recovering the data if a previous holder panicked
pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("Recovering from poisoned lock");
        poisoned.into_inner()
    })
}
