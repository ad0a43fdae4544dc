use crate::error::ObserverError;
use crate::observers::ThresholdBounds;
use crate::sample::Batch;
use log::{debug, warn};
use std::fmt;

/// Callback invoked when an observer leaves its threshold bounds
pub type Reaction = Box<dyn FnMut() + Send>;

/// Threshold bookkeeping shared by every observer kind
///
/// Holds the bounds, the current in/out-of-threshold flag and the optional
/// reaction. The flag starts out `true` and is only changed through
/// [`ThresholdState::set_in_threshold`], which is where transition detection
/// happens: a `true -> false` transition fires the reaction exactly once,
/// every other transition is silent.
pub struct ThresholdState {
    name: String,
    bounds: ThresholdBounds,
    reaction: Option<Reaction>,
    in_threshold: bool,
}

impl ThresholdState {
    pub fn new(name: impl Into<String>, bounds: ThresholdBounds, reaction: Option<Reaction>) -> Self {
        Self {
            name: name.into(),
            bounds,
            reaction,
            in_threshold: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bounds(&self) -> ThresholdBounds {
        self.bounds
    }

    /// Replace the bounds with a freshly validated pair
    ///
    /// The current in-threshold flag is left untouched until the next
    /// comparison.
    pub fn set_bounds(&mut self, lower: Option<f64>, upper: Option<f64>) -> Result<(), ObserverError> {
        self.bounds = ThresholdBounds::new(lower, upper)?;
        debug!("Observer '{}' bounds set to {}", self.name, self.bounds);
        Ok(())
    }

    pub fn in_threshold(&self) -> bool {
        self.in_threshold
    }

    /// Update the in-threshold flag, firing the reaction on a `true -> false`
    /// transition
    ///
    /// The reaction runs synchronously before this method returns.
    ///
    /// # Returns
    ///
    /// `true` if the update was a `true -> false` transition
    pub fn set_in_threshold(&mut self, in_threshold: bool) -> bool {
        let left_threshold = self.in_threshold && !in_threshold;
        self.in_threshold = in_threshold;

        if left_threshold {
            warn!(
                "Observer '{}' left its threshold bounds {}",
                self.name, self.bounds
            );
            if let Some(reaction) = self.reaction.as_mut() {
                reaction();
            }
        }

        left_threshold
    }

    /// Compare one or more values against the bounds and update the flag
    ///
    /// A batch is in threshold only if every value satisfies both active
    /// bounds.
    pub fn compare(&mut self, values: &[f64]) -> bool {
        let in_threshold = self.bounds.contains_all(values);
        self.set_in_threshold(in_threshold);
        in_threshold
    }
}

impl fmt::Debug for ThresholdState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThresholdState")
            .field("name", &self.name)
            .field("bounds", &self.bounds)
            .field("has_reaction", &self.reaction.is_some())
            .field("in_threshold", &self.in_threshold)
            .finish()
    }
}

/// An entity tracking one measured quantity and its threshold state
///
/// Implemented by [`crate::observers::Watcher`] (pull) and
/// [`crate::observers::Listener`] (push).
pub trait Observer: Send {
    fn state(&self) -> &ThresholdState;

    fn state_mut(&mut self) -> &mut ThresholdState;

    /// Produce the latest samples; an empty batch means "no opinion this cycle"
    ///
    /// Never blocks on a passive feed.
    fn measure(&mut self) -> Batch;

    /// Release background resources; a no-op for observers without any
    fn stop(&mut self) -> Result<(), ObserverError> {
        Ok(())
    }

    fn name(&self) -> &str {
        self.state().name()
    }

    fn in_threshold(&self) -> bool {
        self.state().in_threshold()
    }

    fn compare(&mut self, values: &[f64]) -> bool {
        self.state_mut().compare(values)
    }
}
