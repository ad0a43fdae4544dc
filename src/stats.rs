//! Self-monitoring counters for the monitor's own cycles
//!
//! Tracks how many cycles ran, how much data they carried and how long they
//! took, plus delivery failures of sinks and alert channels.

use log::debug;
use std::collections::VecDeque;
use std::time::Duration;

/// Number of recent cycle durations kept for the mean
const MAX_DURATION_SAMPLES: usize = 100;

/// Counters describing the monitor's cycle history
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleStats {
    /// Cycles run, including empty ones
    pub cycles: u64,
    /// Cycles in which no observer reported data
    pub empty_cycles: u64,
    /// Samples inserted into the buffer (after resampling)
    pub samples_ingested: u64,
    /// Rows dropped from the buffer by the capacity limit
    pub rows_evicted: u64,
    pub sink_failures: u64,
    pub alert_failures: u64,
    /// Duration of the most recent cycle
    pub last_cycle: Option<Duration>,
    recent_durations: VecDeque<Duration>,
}

impl CycleStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished cycle that ingested `samples` rows
    pub fn record_cycle(&mut self, samples: usize, evicted: usize, duration: Duration) {
        self.cycles += 1;
        if samples == 0 {
            self.empty_cycles += 1;
        }
        self.samples_ingested += samples as u64;
        self.rows_evicted += evicted as u64;
        self.last_cycle = Some(duration);

        self.recent_durations.push_back(duration);
        while self.recent_durations.len() > MAX_DURATION_SAMPLES {
            self.recent_durations.pop_front();
        }

        debug!(
            "Cycle {} took {:?} ({} samples, {} evicted)",
            self.cycles, duration, samples, evicted
        );
    }

    pub fn record_sink_failure(&mut self) {
        self.sink_failures += 1;
    }

    pub fn record_alert_failure(&mut self) {
        self.alert_failures += 1;
    }

    /// Mean duration over the last 100 cycles
    pub fn mean_cycle_duration(&self) -> Option<Duration> {
        if self.recent_durations.is_empty() {
            return None;
        }
        let total: Duration = self.recent_durations.iter().sum();
        Some(total / self.recent_durations.len() as u32)
    }
}
