use crate::error::SchedulerError;
use log::{debug, error, info};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Longest uninterrupted sleep while waiting for a deadline, so that a stop
/// request is noticed promptly
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// A blocking function that returns whenever a cycle should run
///
/// Any `FnMut()` closure is a trigger.
pub trait Trigger: Send {
    fn wait(&mut self);
}

impl<F> Trigger for F
where
    F: FnMut() + Send,
{
    fn wait(&mut self) {
        self()
    }
}

/// How the scheduler fires cycles
pub enum Schedule {
    /// Fire on a fixed, drift-corrected period
    Periodic(Duration),
    /// Fire once per return of the trigger
    Triggered(Box<dyn Trigger>),
}

impl Schedule {
    /// Build a schedule from exactly one of a period or a trigger
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Configuration` when both or neither are given,
    /// or when the period is zero.
    pub fn from_options(
        period: Option<Duration>,
        trigger: Option<Box<dyn Trigger>>,
    ) -> Result<Self, SchedulerError> {
        match (period, trigger) {
            (Some(period), None) => Self::periodic(period),
            (None, Some(trigger)) => Ok(Schedule::Triggered(trigger)),
            _ => Err(SchedulerError::Configuration(
                "exactly one of {period, trigger} required".to_string(),
            )),
        }
    }

    /// Periodic schedule with a non-zero period
    pub fn periodic(period: Duration) -> Result<Self, SchedulerError> {
        if period.is_zero() {
            return Err(SchedulerError::Configuration(
                "period must be greater than zero".to_string(),
            ));
        }
        Ok(Schedule::Periodic(period))
    }

    pub fn triggered(trigger: impl Trigger + 'static) -> Self {
        Schedule::Triggered(Box::new(trigger))
    }
}

impl fmt::Debug for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Periodic(period) => f.debug_tuple("Periodic").field(period).finish(),
            Schedule::Triggered(_) => f.write_str("Triggered"),
        }
    }
}

/// Absolute deadlines on a fixed phase grid
///
/// Deadlines advance by exactly one period regardless of how long a cycle
/// took, so the mean interval converges to the period. After an overrun the
/// missed deadlines are skipped except the most recent one, which fires
/// immediately; the grid phase is kept.
#[derive(Debug, Clone, Copy)]
pub struct PeriodicClock {
    next_fire: Instant,
    period: Duration,
}

impl PeriodicClock {
    pub fn starting_at(start: Instant, period: Duration) -> Self {
        Self {
            next_fire: start,
            period,
        }
    }

    pub fn next_fire(&self) -> Instant {
        self.next_fire
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Move to the next deadline after a cycle finished at `now`
    ///
    /// # Returns
    ///
    /// Number of deadlines skipped because they were already past
    pub fn advance(&mut self, now: Instant) -> u32 {
        self.next_fire += self.period;

        let behind = now.saturating_duration_since(self.next_fire);
        let missed = behind.as_nanos() / self.period.as_nanos().max(1);
        let missed = u32::try_from(missed).unwrap_or(u32::MAX);
        if missed > 0 {
            self.next_fire += self.period * missed;
        }
        missed
    }
}

/// Drives cycles on a dedicated thread
///
/// `start()` returns immediately. `stop()` only raises a flag that the loop
/// checks before each cycle, so an in-flight cycle always completes. Every
/// `start()` gets a fresh flag and fresh deadline state, and first waits for
/// a loop still winding down after `stop()`, so two loops never overlap.
#[derive(Debug, Default)]
pub struct Scheduler {
    running: Option<Arc<AtomicBool>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| running.load(Ordering::SeqCst))
    }

    /// Launch the run loop
    ///
    /// If a stopped loop is still finishing its last cycle, this waits for
    /// it first; in triggered mode that means until its trigger returns.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::AlreadyRunning` if a loop is active and
    /// `SchedulerError::Spawn` if the thread cannot be created.
    pub fn start<C>(&mut self, schedule: Schedule, cycle: C) -> Result<(), SchedulerError>
    where
        C: FnMut() + Send + 'static,
    {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        if let Some(previous) = self.thread_handle.take() {
            if !previous.is_finished() {
                debug!("Waiting for previous scheduler loop to finish its last cycle");
            }
            if previous.join().is_err() {
                error!("Previous scheduler thread panicked");
            }
        }

        let running = Arc::new(AtomicBool::new(true));
        let loop_flag = Arc::clone(&running);

        info!("Starting scheduler: {:?}", schedule);
        let handle = thread::Builder::new()
            .name("scheduler".to_string())
            .spawn(move || match schedule {
                Schedule::Periodic(period) => Self::periodic_loop(period, cycle, loop_flag),
                Schedule::Triggered(trigger) => Self::triggered_loop(trigger, cycle, loop_flag),
            })
            .map_err(SchedulerError::Spawn)?;

        self.running = Some(running);
        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Ask the loop to exit after its current cycle; does not block
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.store(false, Ordering::SeqCst);
            info!("Scheduler stop requested");
        }
    }

    /// Wait for the loop thread to exit
    ///
    /// In triggered mode this blocks until the trigger returns.
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                error!("Scheduler thread panicked");
            }
        }
    }

    fn periodic_loop<C: FnMut()>(period: Duration, mut cycle: C, running: Arc<AtomicBool>) {
        let mut clock = PeriodicClock::starting_at(Instant::now(), period);

        while running.load(Ordering::SeqCst) {
            if !Self::sleep_until(clock.next_fire(), &running) {
                break;
            }

            cycle();

            let skipped = clock.advance(Instant::now());
            if skipped > 0 {
                debug!(
                    "Cycle overran its period of {:?}; skipped {} deadline(s)",
                    period, skipped
                );
            }
        }

        info!("Periodic scheduler loop stopped");
    }

    fn triggered_loop<C: FnMut()>(
        mut trigger: Box<dyn Trigger>,
        mut cycle: C,
        running: Arc<AtomicBool>,
    ) {
        while running.load(Ordering::SeqCst) {
            trigger.wait();
            if !running.load(Ordering::SeqCst) {
                break;
            }
            cycle();
        }

        info!("Triggered scheduler loop stopped");
    }

    /// Sleep until `deadline` in short slices
    ///
    /// # Returns
    ///
    /// `false` if a stop was requested while sleeping
    fn sleep_until(deadline: Instant, running: &AtomicBool) -> bool {
        loop {
            if !running.load(Ordering::SeqCst) {
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }
            thread::sleep(remaining.min(SLEEP_SLICE));
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
