//! Core sample types for the monitoring core
//!
//! A `Sample` is one timestamped measurement of one named quantity. A batch
//! is a set of samples produced during a single cycle, possibly spanning
//! several observers (columns).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp type for consistent time handling across the application
pub type Timestamp = DateTime<Utc>;

/// A batch of samples, sorted by timestamp once it leaves the monitor
pub type Batch = Vec<Sample>;

/// A single timestamped measurement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    /// When the value was measured or received
    pub timestamp: Timestamp,
    /// Name of the observer (column) that produced the value
    pub name: String,
    /// Measured value
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: Timestamp, name: impl Into<String>, value: f64) -> Self {
        Self {
            timestamp,
            name: name.into(),
            value,
        }
    }

    /// Stamp a value with the current instant
    pub fn now(name: impl Into<String>, value: f64) -> Self {
        Self::new(Utc::now(), name, value)
    }
}

/// Sort a batch chronologically.
///
/// The sort is stable, so samples sharing a timestamp keep their relative
/// order (registration order, then arrival order).
pub fn sort_batch(batch: &mut [Sample]) {
    batch.sort_by_key(|sample| sample.timestamp);
}

/// Column names of a batch in order of first appearance
pub fn column_names(batch: &[Sample]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for sample in batch {
        if !names.iter().any(|name| name == &sample.name) {
            names.push(sample.name.clone());
        }
    }
    names
}
