use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// Sliding-window rate limiter for alert delivery
///
/// Tracks when recent alerts were sent and allows at most `max_per_window`
/// within any trailing window.
#[derive(Debug)]
pub struct RateLimiter {
    /// Maximum number of alerts allowed per window
    max_per_window: usize,
    /// Length of the sliding window
    window: Duration,
    /// Send times within the current window, oldest first
    recent: VecDeque<DateTime<Utc>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::per_minute(3)
    }
}

impl RateLimiter {
    pub fn new(max_per_window: usize, window: Duration) -> Self {
        Self {
            max_per_window,
            window,
            recent: VecDeque::new(),
        }
    }

    /// Limiter with a one-minute window
    pub fn per_minute(max_per_minute: usize) -> Self {
        Self::new(max_per_minute, Duration::minutes(1))
    }

    /// Whether an alert may be sent now
    pub fn can_send(&mut self) -> bool {
        self.can_send_at(Utc::now())
    }

    /// Whether an alert may be sent at `now`
    pub fn can_send_at(&mut self, now: DateTime<Utc>) -> bool {
        self.expire(now);
        self.recent.len() < self.max_per_window
    }

    /// Record an alert sent now
    pub fn record(&mut self) {
        self.record_at(Utc::now());
    }

    /// Record an alert sent at `timestamp`
    pub fn record_at(&mut self, timestamp: DateTime<Utc>) {
        let position = self.recent.partition_point(|&sent| sent <= timestamp);
        self.recent.insert(position, timestamp);
    }

    /// Number of alerts within the window ending at `now`
    pub fn count_at(&mut self, now: DateTime<Utc>) -> usize {
        self.expire(now);
        self.recent.len()
    }

    fn expire(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.window;
        while let Some(&oldest) = self.recent.front() {
            if oldest <= cutoff {
                self.recent.pop_front();
            } else {
                break;
            }
        }
    }
}
