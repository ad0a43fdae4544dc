//! Consumers of new data
//!
//! The monitor hands every post-resampling batch to each registered sink,
//! synchronously and in registration order on the scheduler thread. A slow
//! sink therefore delays the next cycle; wrap it in [`AsyncSink`] to move
//! delivery onto its own thread.

use crate::error::SinkError;
use crate::sample::{column_names, Sample};
use log::info;

/// CSV file logging
pub mod csv_file;

/// Background delivery wrapper
pub mod async_sink;

pub use async_sink::AsyncSink;
pub use csv_file::CsvFileSink;

/// Receives every new batch produced by the monitor
///
/// Sinks are shared with the monitor, never owned by it: the monitor only
/// holds an `Arc` and never closes a sink.
#[cfg_attr(test, mockall::automock)]
pub trait Sink: Send + Sync {
    fn update(&self, batch: &[Sample]) -> Result<(), SinkError>;
}

/// Sink that logs a one-line summary of each batch at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl Sink for LogSink {
    fn update(&self, batch: &[Sample]) -> Result<(), SinkError> {
        if let (Some(first), Some(last)) = (batch.first(), batch.last()) {
            info!(
                "{} new sample(s) for [{}] between {} and {}",
                batch.len(),
                column_names(batch).join(", "),
                first.timestamp,
                last.timestamp
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_sink_accepts_any_batch() {
        assert!(LogSink.update(&[]).is_ok());
        assert!(LogSink.update(&[Sample::now("a", 1.0)]).is_ok());
    }

    #[test]
    fn test_mock_sink_sees_batch() {
        let mut mock = MockSink::new();
        mock.expect_update()
            .withf(|batch: &[Sample]| batch.len() == 2)
            .times(1)
            .returning(|_| Ok(()));

        let batch = vec![Sample::now("a", 1.0), Sample::now("b", 2.0)];
        assert!(mock.update(&batch).is_ok());
    }
}
