use crate::sample::{Batch, Sample, Timestamp};
use chrono::DateTime;
use std::collections::BTreeMap;
use std::time::Duration;

/// Time-bucketed averaging of samples
///
/// Samples are grouped per column into buckets of `floor(t / width)`, each
/// bucket reduced to its arithmetic mean and re-stamped with the bucket
/// start. Without a width the resampler is the identity.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Resampler {
    bucket_width: Option<Duration>,
}

impl Resampler {
    pub fn new(bucket_width: Option<Duration>) -> Self {
        Self { bucket_width }
    }

    /// A resampler that passes batches through unchanged
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn bucket_width(&self) -> Option<Duration> {
        self.bucket_width
    }

    pub fn resample(&self, batch: &[Sample]) -> Batch {
        resample(batch, self.bucket_width)
    }
}

/// Bucket a batch by time and average each column per bucket
///
/// The output is ordered by bucket start, then by column name. A column
/// with no samples in a bucket produces no entry there. Widths below one
/// microsecond disable resampling.
pub fn resample(batch: &[Sample], bucket_width: Option<Duration>) -> Batch {
    let width_us = match bucket_width.map(|width| width.as_micros()) {
        Some(width) if width > 0 => i64::try_from(width).unwrap_or(i64::MAX),
        _ => return batch.to_vec(),
    };

    // (bucket start in microseconds, column) -> (sum, count)
    let mut buckets: BTreeMap<(i64, &str), (f64, u32)> = BTreeMap::new();

    for sample in batch {
        let start = sample.timestamp.timestamp_micros().div_euclid(width_us) * width_us;
        let entry = buckets.entry((start, sample.name.as_str())).or_insert((0.0, 0));
        entry.0 += sample.value;
        entry.1 += 1;
    }

    buckets
        .into_iter()
        .filter_map(|((start, column), (sum, count))| {
            let timestamp: Timestamp = DateTime::from_timestamp_micros(start)?;
            Some(Sample::new(timestamp, column, sum / f64::from(count)))
        })
        .collect()
}
