use crate::alerts::RateLimiter;
use crate::error::AlertError;
use crate::lock_or_recover;
use log::warn;
use std::sync::{Arc, Mutex};

/// Receives formatted alert text when the monitor leaves its thresholds
///
/// Channels are shared with the monitor, never owned by it: the monitor
/// only holds an `Arc` and never closes a channel.
#[cfg_attr(test, mockall::automock)]
pub trait AlertChannel: Send + Sync {
    fn send(&self, message: &str) -> Result<(), AlertError>;
}

/// Alert channel writing through the `log` facade at warn level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertChannel;

impl AlertChannel for LogAlertChannel {
    fn send(&self, message: &str) -> Result<(), AlertError> {
        warn!("ALERT: {}", message);
        Ok(())
    }
}

/// Wraps a channel and drops alerts beyond a sliding-window rate
///
/// Dropped alerts are reported as `AlertError::RateLimitExceeded`.
pub struct RateLimitedChannel {
    inner: Arc<dyn AlertChannel>,
    limiter: Mutex<RateLimiter>,
}

impl RateLimitedChannel {
    pub fn new(inner: Arc<dyn AlertChannel>, limiter: RateLimiter) -> Self {
        Self {
            inner,
            limiter: Mutex::new(limiter),
        }
    }

    /// Limit `inner` to `max_per_minute` alerts per minute
    pub fn per_minute(inner: Arc<dyn AlertChannel>, max_per_minute: usize) -> Self {
        Self::new(inner, RateLimiter::per_minute(max_per_minute))
    }
}

impl AlertChannel for RateLimitedChannel {
    fn send(&self, message: &str) -> Result<(), AlertError> {
        let mut limiter = lock_or_recover(&self.limiter);
        if !limiter.can_send() {
            warn!("Alert dropped by rate limit: {}", message);
            return Err(AlertError::RateLimitExceeded);
        }

        self.inner.send(message)?;
        limiter.record();
        Ok(())
    }
}
