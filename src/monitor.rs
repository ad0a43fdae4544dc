//! Monitor orchestrator
//!
//! Owns the observers, the time-series buffer, the resampler and the
//! scheduler. One cycle measures every observer, merges and resamples the
//! reported samples, stores them, re-evaluates thresholds and fans the new
//! batch out to sinks and, on an aggregate threshold violation, to alert
//! channels.

use crate::aggregator::{Resampler, TimeSeriesBuffer};
use crate::alerts::AlertChannel;
use crate::config::{MonitorConfig, DEFAULT_MAX_POINTS};
use crate::error::{ObserverError, SchedulerError};
use crate::lock_or_recover;
use crate::observers::{
    Feed, Listener, Measurer, Observer, Reaction, TcpFeed, ThresholdBounds, Watcher,
};
use crate::sample::{sort_batch, Batch, Sample};
use crate::scheduler::{Schedule, Scheduler};
use crate::sinks::Sink;
use crate::stats::CycleStats;
use log::{debug, error, info, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// State touched by a cycle, guarded by one mutex
struct MonitorCore {
    observers: Vec<Box<dyn Observer>>,
    resampler: Resampler,
    sinks: Vec<Arc<dyn Sink>>,
    alert_channels: Vec<Arc<dyn AlertChannel>>,
    in_threshold: bool,
    stats: CycleStats,
}

/// Reactive monitor driving observers on a schedule
///
/// Registration methods take `&self` and may be called while the scheduler
/// runs; a new observer or sink takes part from the next cycle on. Sinks
/// and alert channels run synchronously on the scheduler thread, so a slow
/// sink delays the next cycle (see [`crate::sinks::AsyncSink`]).
pub struct Monitor {
    core: Arc<Mutex<MonitorCore>>,
    buffer: Arc<Mutex<TimeSeriesBuffer>>,
    scheduler: Scheduler,
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POINTS)
    }
}

impl Monitor {
    /// Create a monitor keeping at most `max_points` rows, without resampling
    pub fn new(max_points: usize) -> Self {
        Self::with_buffer(TimeSeriesBuffer::new(max_points), Resampler::disabled())
    }

    /// Create a monitor from the `[monitor]` configuration section
    pub fn from_config(config: &MonitorConfig) -> Self {
        let mut buffer = TimeSeriesBuffer::new(config.max_points);
        if let Some(retention) = config.retention() {
            buffer = buffer.with_max_age(retention);
        }
        Self::with_buffer(buffer, Resampler::new(config.resample_width()))
    }

    fn with_buffer(buffer: TimeSeriesBuffer, resampler: Resampler) -> Self {
        Self {
            core: Arc::new(Mutex::new(MonitorCore {
                observers: Vec::new(),
                resampler,
                sinks: Vec::new(),
                alert_channels: Vec::new(),
                in_threshold: true,
                stats: CycleStats::new(),
            })),
            buffer: Arc::new(Mutex::new(buffer)),
            scheduler: Scheduler::new(),
        }
    }

    /// Resample every cycle's batch into buckets of `width`
    pub fn with_resample_width(self, width: Option<Duration>) -> Self {
        lock_or_recover(&self.core).resampler = Resampler::new(width);
        self
    }

    /// Register an active observer sampled once per cycle
    ///
    /// `name` defaults to the measurer's label. Returns the name the
    /// observer was registered under.
    pub fn watch(
        &self,
        measurer: impl Measurer + 'static,
        name: Option<&str>,
        bounds: ThresholdBounds,
        reaction: Option<Reaction>,
    ) -> String {
        self.register(Box::new(Watcher::new(name, measurer, bounds, reaction)))
    }

    /// Register a passive observer on a TCP feed and start receiving
    ///
    /// # Errors
    ///
    /// Returns `ObserverError::Feed` if the connection fails and
    /// `ObserverError::Spawn` if the receive thread cannot be started.
    pub fn listen(
        &self,
        name: &str,
        address: &str,
        bounds: ThresholdBounds,
        reaction: Option<Reaction>,
    ) -> Result<(), ObserverError> {
        let feed = TcpFeed::connect(address)?;
        self.listen_feed(name, feed, bounds, reaction)
    }

    /// Register a passive observer on any feed and start receiving
    pub fn listen_feed(
        &self,
        name: &str,
        feed: impl Feed,
        bounds: ThresholdBounds,
        reaction: Option<Reaction>,
    ) -> Result<(), ObserverError> {
        let listener = Listener::start(name, feed, bounds, reaction)?;
        self.register(Box::new(listener));
        Ok(())
    }

    /// Add an observer, replacing (and stopping) one with the same name
    fn register(&self, observer: Box<dyn Observer>) -> String {
        let name = observer.name().to_string();
        let mut core = lock_or_recover(&self.core);

        match core.observers.iter().position(|o| o.name() == name) {
            Some(index) => {
                warn!("Observer '{}' already registered, replacing it", name);
                let mut previous = std::mem::replace(&mut core.observers[index], observer);
                if let Err(e) = previous.stop() {
                    debug!("Replaced observer '{}': {}", name, e);
                }
            }
            None => {
                info!("Registered observer '{}'", name);
                core.observers.push(observer);
            }
        }

        name
    }

    pub fn add_sink(&self, sink: Arc<dyn Sink>) {
        lock_or_recover(&self.core).sinks.push(sink);
    }

    pub fn add_alert_channel(&self, channel: Arc<dyn AlertChannel>) {
        lock_or_recover(&self.core).alert_channels.push(channel);
    }

    /// Replace the bounds of a registered observer
    ///
    /// Returns `Ok(false)` if no observer has that name. The new bounds are
    /// applied from the next comparison on; the current threshold state is
    /// left as is.
    pub fn set_bounds(
        &self,
        name: &str,
        lower: Option<f64>,
        upper: Option<f64>,
    ) -> Result<bool, ObserverError> {
        let mut core = lock_or_recover(&self.core);
        match core.observers.iter_mut().find(|o| o.name() == name) {
            Some(observer) => {
                observer.state_mut().set_bounds(lower, upper)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Run one cycle on the calling thread
    ///
    /// Returns the post-resampling batch handed to the sinks, or `None` if
    /// no observer reported data.
    pub fn run_cycle(&self) -> Option<Batch> {
        Self::cycle(&self.core, &self.buffer)
    }

    fn cycle(core: &Mutex<MonitorCore>, buffer: &Mutex<TimeSeriesBuffer>) -> Option<Batch> {
        let started = Instant::now();
        let mut guard = lock_or_recover(core);
        let core = &mut *guard;

        // Poll in registration order; empty batches have no opinion
        let mut reporters = Vec::new();
        let mut merged: Batch = Vec::new();
        for (index, observer) in core.observers.iter_mut().enumerate() {
            let batch = observer.measure();
            if !batch.is_empty() {
                reporters.push(index);
                merged.extend(batch);
            }
        }

        if merged.is_empty() {
            core.stats.record_cycle(0, 0, started.elapsed());
            return None;
        }

        sort_batch(&mut merged);
        let batch = core.resampler.resample(&merged);
        let evicted = lock_or_recover(buffer).insert(&batch);

        let mut aggregate = true;
        for &index in &reporters {
            let observer = &mut core.observers[index];
            let values: Vec<f64> = batch
                .iter()
                .filter(|sample| sample.name == observer.name())
                .map(|sample| sample.value)
                .collect();
            aggregate &= observer.compare(&values);
        }

        let was_in_threshold = core.in_threshold;
        core.in_threshold = aggregate;
        if was_in_threshold && !aggregate {
            core.send_alert();
        } else if !was_in_threshold && aggregate {
            info!("All reporting observers are back within threshold");
        }

        core.notify_sinks(&batch);
        core.stats.record_cycle(batch.len(), evicted, started.elapsed());
        Some(batch)
    }

    /// Start cycling on a background thread
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::AlreadyRunning` if the monitor is running.
    pub fn start(&mut self, schedule: Schedule) -> Result<(), SchedulerError> {
        let core = Arc::clone(&self.core);
        let buffer = Arc::clone(&self.buffer);

        self.scheduler.start(schedule, move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| Self::cycle(&core, &buffer)));
            if result.is_err() {
                error!("Monitor cycle panicked, continuing with the next one");
            }
        })
    }

    /// Ask the scheduler to stop after the in-flight cycle; does not block
    pub fn stop(&mut self) {
        self.scheduler.stop();
    }

    /// Wait for the scheduler thread to exit
    pub fn join(&mut self) {
        self.scheduler.join();
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Stop the scheduler and every listener, then wait for the scheduler
    ///
    /// In triggered mode this blocks until the trigger returns once more.
    pub fn shutdown(&mut self) {
        info!("Shutting down monitor");
        self.scheduler.stop();

        {
            let mut core = lock_or_recover(&self.core);
            for observer in core.observers.iter_mut() {
                if let Err(e) = observer.stop() {
                    debug!("Stopping observer '{}': {}", observer.name(), e);
                }
            }
        }

        self.scheduler.join();
        info!("Monitor stopped");
    }

    /// Aggregate threshold state as of the last non-empty cycle
    pub fn in_threshold(&self) -> bool {
        lock_or_recover(&self.core).in_threshold
    }

    /// Copy of the full buffered history in timestamp order
    pub fn snapshot(&self) -> Vec<Sample> {
        lock_or_recover(&self.buffer).snapshot()
    }

    /// Observer names in registration order
    pub fn observer_names(&self) -> Vec<String> {
        lock_or_recover(&self.core)
            .observers
            .iter()
            .map(|observer| observer.name().to_string())
            .collect()
    }

    pub fn observer_in_threshold(&self, name: &str) -> Option<bool> {
        lock_or_recover(&self.core)
            .observers
            .iter()
            .find(|observer| observer.name() == name)
            .map(|observer| observer.in_threshold())
    }

    pub fn stats(&self) -> CycleStats {
        lock_or_recover(&self.core).stats.clone()
    }
}

impl MonitorCore {
    /// Alert text naming every observer currently out of threshold
    fn alert_message(&self) -> String {
        let names: Vec<&str> = self
            .observers
            .iter()
            .filter(|observer| !observer.in_threshold())
            .map(|observer| observer.name())
            .collect();
        format!("Observers [{}] are out of threshold!", names.join(", "))
    }

    fn send_alert(&mut self) {
        let message = self.alert_message();
        warn!("{}", message);

        for channel in &self.alert_channels {
            let result = panic::catch_unwind(AssertUnwindSafe(|| channel.send(&message)));
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Alert channel failed: {}", e);
                    self.stats.record_alert_failure();
                }
                Err(_) => {
                    error!("Alert channel panicked");
                    self.stats.record_alert_failure();
                }
            }
        }
    }

    fn notify_sinks(&mut self, batch: &[Sample]) {
        for sink in &self.sinks {
            let result = panic::catch_unwind(AssertUnwindSafe(|| sink.update(batch)));
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Sink failed to accept batch: {}", e);
                    self.stats.record_sink_failure();
                }
                Err(_) => {
                    error!("Sink panicked while accepting batch");
                    self.stats.record_sink_failure();
                }
            }
        }
    }
}
