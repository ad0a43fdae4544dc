/// Alert channel trait and built-in channels
pub mod alert_channel;
pub mod rate_limiter;

pub use alert_channel::{AlertChannel, LogAlertChannel, RateLimitedChannel};
pub use rate_limiter::RateLimiter;

#[cfg(test)]
pub use alert_channel::MockAlertChannel;
