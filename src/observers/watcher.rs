use crate::error::ObserverError;
use crate::observers::{Observer, Reaction, ThresholdBounds, ThresholdState};
use crate::sample::{Batch, Sample, Timestamp};
use chrono::Utc;
use log::warn;

/// Result of a single measurement
#[derive(Debug, Clone, PartialEq)]
pub enum Measurement {
    /// A single value, stamped with the instant the measurement started
    Value(f64),
    /// Values the measurer timestamped itself
    Batch(Vec<(Timestamp, f64)>),
}

impl From<f64> for Measurement {
    fn from(value: f64) -> Self {
        Measurement::Value(value)
    }
}

impl From<Vec<(Timestamp, f64)>> for Measurement {
    fn from(values: Vec<(Timestamp, f64)>) -> Self {
        Measurement::Batch(values)
    }
}

/// A pull-based measurement source
///
/// Any `FnMut() -> T` closure or function with `T: Into<Measurement>` is a
/// measurer. Implement the trait directly for sources that can fail.
pub trait Measurer: Send {
    fn measure(&mut self) -> Result<Measurement, ObserverError>;

    /// Identifying label, used as the observer name when none is given
    fn label(&self) -> String;
}

impl<F, M> Measurer for F
where
    F: FnMut() -> M + Send,
    M: Into<Measurement>,
{
    fn measure(&mut self) -> Result<Measurement, ObserverError> {
        Ok(self().into())
    }

    fn label(&self) -> String {
        label_from_type_name(std::any::type_name::<F>())
    }
}

/// Last meaningful path segment of a type name
///
/// `app::sensors::read_temp` becomes `read_temp`, and for closures the
/// enclosing function name is used (`app::main::{{closure}}` -> `main`).
fn label_from_type_name(type_name: &str) -> String {
    type_name
        .split("::")
        .filter(|segment| !segment.starts_with("{{"))
        .last()
        .unwrap_or(type_name)
        .to_string()
}

/// Active (pull-based) observer, sampled once per scheduler cycle
pub struct Watcher {
    state: ThresholdState,
    measurer: Box<dyn Measurer>,
}

impl Watcher {
    /// Create a watcher around a measurer
    ///
    /// # Arguments
    ///
    /// * `name` - Column name; defaults to the measurer's label
    /// * `measurer` - The measurement source
    /// * `bounds` - Threshold bounds, already validated
    /// * `reaction` - Optional callback fired when the value leaves its bounds
    pub fn new(
        name: Option<&str>,
        measurer: impl Measurer + 'static,
        bounds: ThresholdBounds,
        reaction: Option<Reaction>,
    ) -> Self {
        let name = name.map_or_else(|| measurer.label(), str::to_string);
        Self {
            state: ThresholdState::new(name, bounds, reaction),
            measurer: Box::new(measurer),
        }
    }
}

impl Observer for Watcher {
    fn state(&self) -> &ThresholdState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ThresholdState {
        &mut self.state
    }

    fn measure(&mut self) -> Batch {
        let now = Utc::now();
        match self.measurer.measure() {
            Ok(Measurement::Value(value)) => vec![Sample::new(now, self.state.name(), value)],
            Ok(Measurement::Batch(values)) => values
                .into_iter()
                .map(|(timestamp, value)| Sample::new(timestamp, self.state.name(), value))
                .collect(),
            Err(e) => {
                warn!("Watcher '{}' failed to measure: {}", self.state.name(), e);
                Vec::new()
            }
        }
    }
}
