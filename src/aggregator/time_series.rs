//! Bounded, chronologically ordered time-series buffer
//!
//! This module provides the TimeSeriesBuffer which stores every ingested
//! sample in timestamp order, with FIFO eviction once `max_points` is
//! exceeded and optional age-based pruning.

use crate::sample::{Sample, Timestamp};
use chrono::Duration;
use std::collections::VecDeque;

/// Ordered sample store with capacity and retention limits
///
/// Each sample is one row; the logical columns are the distinct sample
/// names. Inserts merge into the existing order rather than appending, so
/// a late batch carrying older timestamps lands in its chronological
/// position. The buffer itself is not synchronised: the monitor keeps it
/// behind a single mutex so that readers never see a partial insert.
#[derive(Debug, Clone)]
pub struct TimeSeriesBuffer {
    /// Rows in ascending timestamp order
    rows: VecDeque<Sample>,
    /// Maximum number of rows retained
    max_points: usize,
    /// Maximum age of a row relative to the newest row
    max_age: Option<Duration>,
}

impl TimeSeriesBuffer {
    /// Create a new buffer holding at most `max_points` rows
    ///
    /// # Examples
    ///
    /// ```
    /// use vigil::aggregator::TimeSeriesBuffer;
    ///
    /// let buffer = TimeSeriesBuffer::new(1000);
    /// assert!(buffer.is_empty());
    /// ```
    pub fn new(max_points: usize) -> Self {
        Self {
            rows: VecDeque::with_capacity(max_points.min(4096)),
            max_points,
            max_age: None,
        }
    }

    /// Additionally drop rows older than `max_age` relative to the newest row
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn max_points(&self) -> usize {
        self.max_points
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Merge a batch into the store and enforce the limits
    ///
    /// # Returns
    ///
    /// Number of rows evicted by this insert
    pub fn insert(&mut self, batch: &[Sample]) -> usize {
        if batch.is_empty() {
            return 0;
        }

        let mut incoming = batch.to_vec();
        incoming.sort_by_key(|sample| sample.timestamp);

        let appends_in_order = match (self.rows.back(), incoming.first()) {
            (Some(last), Some(first)) => first.timestamp >= last.timestamp,
            _ => true,
        };

        if appends_in_order {
            self.rows.extend(incoming);
        } else {
            self.rows = merge_sorted(std::mem::take(&mut self.rows), incoming);
        }

        let mut evicted = self.evict_overflow(self.max_points);
        if let Some(max_age) = self.max_age {
            if let Some(newest) = self.rows.back().map(|sample| sample.timestamp) {
                evicted += self.prune_older_than(newest - max_age);
            }
        }
        evicted
    }

    /// Drop the oldest rows until at most `max_points` remain
    ///
    /// # Returns
    ///
    /// Number of rows removed
    pub fn evict_overflow(&mut self, max_points: usize) -> usize {
        let overflow = self.rows.len().saturating_sub(max_points);
        self.rows.drain(..overflow);
        overflow
    }

    /// Drop every row strictly older than `cutoff`
    pub fn prune_older_than(&mut self, cutoff: Timestamp) -> usize {
        let mut removed = 0;
        while let Some(sample) = self.rows.front() {
            if sample.timestamp < cutoff {
                self.rows.pop_front();
                removed += 1;
            } else {
                break;
            }
        }
        removed
    }

    /// Copy of the full history, oldest first
    pub fn snapshot(&self) -> Vec<Sample> {
        self.rows.iter().cloned().collect()
    }

    /// All `(timestamp, value)` pairs of one column, oldest first
    pub fn column(&self, name: &str) -> Vec<(Timestamp, f64)> {
        self.rows
            .iter()
            .filter(|sample| sample.name == name)
            .map(|sample| (sample.timestamp, sample.value))
            .collect()
    }

    /// Most recent sample of one column
    pub fn latest(&self, name: &str) -> Option<&Sample> {
        self.rows.iter().rev().find(|sample| sample.name == name)
    }

    /// Rows with a timestamp at or after `since`
    pub fn since(&self, since: Timestamp) -> Vec<&Sample> {
        self.rows
            .iter()
            .filter(|sample| sample.timestamp >= since)
            .collect()
    }
}

impl Default for TimeSeriesBuffer {
    fn default() -> Self {
        Self::new(10_000)
    }
}

/// Stable merge of two timestamp-sorted sequences; `existing` wins ties
fn merge_sorted(existing: VecDeque<Sample>, incoming: Vec<Sample>) -> VecDeque<Sample> {
    let mut merged = VecDeque::with_capacity(existing.len() + incoming.len());
    let mut left = existing.into_iter().peekable();
    let mut right = incoming.into_iter().peekable();

    loop {
        let take_left = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => l.timestamp <= r.timestamp,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        let next = if take_left { left.next() } else { right.next() };
        merged.extend(next);
    }

    merged
}


// Property-based tests
#[cfg(test)]
mod property_tests {
    use super::*;
    use chrono::Utc;
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;

    /// Buffer capacity between 1 and 50
    #[derive(Debug, Clone)]
    struct Capacity(usize);

    impl Arbitrary for Capacity {
        fn arbitrary(g: &mut Gen) -> Self {
            Capacity((u8::arbitrary(g) % 50 + 1) as usize)
        }
    }

    /// Batches of millisecond offsets, possibly out of order
    #[derive(Debug, Clone)]
    struct Batches(Vec<Vec<i64>>);

    impl Arbitrary for Batches {
        fn arbitrary(g: &mut Gen) -> Self {
            let batch_count = usize::arbitrary(g) % 20 + 1;
            let batches = (0..batch_count)
                .map(|_| {
                    let size = usize::arbitrary(g) % 5;
                    (0..size).map(|_| (u16::arbitrary(g) % 1000) as i64).collect()
                })
                .collect();
            Batches(batches)
        }
    }

    // Length never exceeds capacity and retained rows are the newest ones
    #[quickcheck]
    fn prop_buffer_keeps_most_recent(capacity: Capacity, batches: Batches) -> bool {
        let mut buffer = TimeSeriesBuffer::new(capacity.0);
        let base = Utc::now();
        let mut all_offsets = Vec::new();

        for batch in &batches.0 {
            let samples: Vec<Sample> = batch
                .iter()
                .map(|&ms| Sample::new(base + Duration::milliseconds(ms), "x", ms as f64))
                .collect();
            buffer.insert(&samples);
            all_offsets.extend(batch.iter().copied());

            if buffer.len() > capacity.0 {
                return false;
            }
        }

        let snapshot = buffer.snapshot();
        let ordered = snapshot.windows(2).all(|w| w[0].timestamp <= w[1].timestamp);

        all_offsets.sort();
        let newest = &all_offsets[all_offsets.len().saturating_sub(capacity.0)..];
        let retained: Vec<i64> = snapshot.iter().map(|s| s.value as i64).collect();

        ordered && retained == newest
    }
}
