/// Cycle scheduler with periodic and triggered modes
pub mod scheduler;

pub use scheduler::{PeriodicClock, Schedule, Scheduler, Trigger};
