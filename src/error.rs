use thiserror::Error;

/// Errors raised by observers and their threshold bounds
#[derive(Error, Debug)]
pub enum ObserverError {
    #[error("Invalid bounds: lower bound {lower} must be less than upper bound {upper}")]
    InvalidBounds { lower: f64, upper: f64 },

    #[error("Observer '{0}' is already stopped")]
    AlreadyStopped(String),

    #[error("Measurement failed: {0}")]
    Measurement(String),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Failed to spawn receive thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Errors that can occur when starting the scheduler
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Scheduler is already running")]
    AlreadyRunning,

    #[error("Failed to spawn scheduler thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Errors produced by a passive data feed
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Feed connection closed")]
    Closed,

    #[error("Failed to parse feed value: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur when delivering a batch to a sink
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to write batch: {0}")]
    WriteFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur when sending alerts
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Failed to send alert: {0}")]
    SendFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_bounds_message() {
        let err = ObserverError::InvalidBounds {
            lower: 2.0,
            upper: 1.0,
        };
        assert_eq!(
            err.to_string(),
            "Invalid bounds: lower bound 2 must be less than upper bound 1"
        );
    }

    #[test]
    fn test_feed_error_converts_into_observer_error() {
        let err: ObserverError = FeedError::Closed.into();
        assert!(matches!(err, ObserverError::Feed(FeedError::Closed)));
    }
}
