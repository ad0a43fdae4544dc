use crate::error::ObserverError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lower and upper threshold bounds for an observer
///
/// Either bound may be absent, which removes the constraint on that side.
/// When both are present, `lower < upper` holds strictly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdBounds {
    lower: Option<f64>,
    upper: Option<f64>,
}

impl ThresholdBounds {
    /// Create bounds, validating that `lower < upper` when both are present
    ///
    /// # Errors
    ///
    /// Returns `ObserverError::InvalidBounds` if `lower >= upper` or if either
    /// bound is NaN.
    pub fn new(lower: Option<f64>, upper: Option<f64>) -> Result<Self, ObserverError> {
        let invalid = || ObserverError::InvalidBounds {
            lower: lower.unwrap_or(f64::NEG_INFINITY),
            upper: upper.unwrap_or(f64::INFINITY),
        };

        if lower.is_some_and(f64::is_nan) || upper.is_some_and(f64::is_nan) {
            return Err(invalid());
        }
        if let (Some(l), Some(u)) = (lower, upper) {
            if l >= u {
                return Err(invalid());
            }
        }

        Ok(Self { lower, upper })
    }

    /// Bounds with no constraint on either side
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn lower(&self) -> Option<f64> {
        self.lower
    }

    pub fn upper(&self) -> Option<f64> {
        self.upper
    }

    /// Check a single value against both active bounds (inclusive)
    pub fn contains(&self, value: f64) -> bool {
        self.lower.map_or(true, |lower| value >= lower)
            && self.upper.map_or(true, |upper| value <= upper)
    }

    /// Check every value of a batch; an empty slice is vacuously in bounds
    pub fn contains_all(&self, values: &[f64]) -> bool {
        values.iter().all(|&value| self.contains(value))
    }
}

impl fmt::Display for ThresholdBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |bound: Option<f64>| bound.map_or_else(|| "-".to_string(), |b| b.to_string());
        write!(f, "[{}, {}]", show(self.lower), show(self.upper))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_inverted_bounds() {
        assert!(matches!(
            ThresholdBounds::new(Some(10.0), Some(0.0)),
            Err(ObserverError::InvalidBounds { .. })
        ));
    }

    #[test]
    fn test_rejects_equal_bounds() {
        assert!(ThresholdBounds::new(Some(1.0), Some(1.0)).is_err());
    }

    #[test]
    fn test_rejects_nan_bound() {
        assert!(ThresholdBounds::new(Some(f64::NAN), None).is_err());
        assert!(ThresholdBounds::new(None, Some(f64::NAN)).is_err());
    }

    #[test]
    fn test_inclusive_bounds() {
        let bounds = ThresholdBounds::new(Some(0.0), Some(10.0)).unwrap();
        assert!(bounds.contains(0.0));
        assert!(bounds.contains(10.0));
        assert!(!bounds.contains(-0.1));
        assert!(!bounds.contains(10.1));
        assert!(!bounds.contains(f64::NAN));
    }

    #[test]
    fn test_single_sided_bounds() {
        let lower_only = ThresholdBounds::new(Some(5.0), None).unwrap();
        assert!(lower_only.contains(f64::INFINITY));
        assert!(!lower_only.contains(4.0));

        let upper_only = ThresholdBounds::new(None, Some(5.0)).unwrap();
        assert!(upper_only.contains(f64::NEG_INFINITY));
        assert!(!upper_only.contains(6.0));
    }

    #[test]
    fn test_contains_all_uses_every_value() {
        let bounds = ThresholdBounds::new(Some(0.0), Some(1.0)).unwrap();
        assert!(bounds.contains_all(&[0.2, 0.5, 1.0]));
        assert!(!bounds.contains_all(&[0.2, 1.5, 0.5]));
        assert!(bounds.contains_all(&[]));
    }

    #[test]
    fn test_display() {
        let bounds = ThresholdBounds::new(Some(0.5), None).unwrap();
        assert_eq!(bounds.to_string(), "[0.5, -]");
    }
}
