/// Bounded time-series buffer
pub mod time_series;

/// Time-bucket resampling
pub mod resampler;

pub use resampler::{resample, Resampler};
pub use time_series::TimeSeriesBuffer;
