//! Confidence/activity threshold policy.
//!
//! The live classifier and the archive reader both label rows with this
//! policy, so a threshold change is applied consistently to new and
//! previously stored data.

use serde::{Deserialize, Serialize};

use crate::classification::ResponseType;

/// Default low threshold.
pub const DEFAULT_LOW_THRESHOLD: f64 = 0.3;

/// Default high threshold.
pub const DEFAULT_HIGH_THRESHOLD: f64 = 0.7;

/// Classify a (confidence, activity) pair.
///
/// The larger of the two is compared against the thresholds: above `high`
/// is a seizure, above `low` is a threshold crossing, anything else is
/// normal activity. Both comparisons are strict.
pub fn classify_levels(confidence: f64, activity: f64, low: f64, high: f64) -> ResponseType {
    if confidence > high || activity > high {
        ResponseType::SeizureDetected
    } else if confidence > low || activity > low {
        ResponseType::ThresholdExceeded
    } else {
        ResponseType::NormalActivity
    }
}

/// Low/high threshold pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Values above this are at least a threshold crossing
    pub low: f64,
    /// Values above this are a seizure
    pub high: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low: DEFAULT_LOW_THRESHOLD,
            high: DEFAULT_HIGH_THRESHOLD,
        }
    }
}

impl Thresholds {
    /// Create a threshold pair. Ordering is not enforced.
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// Whether `low < high`.
    pub fn is_ordered(&self) -> bool {
        self.low < self.high
    }

    /// Classify a (confidence, activity) pair against these thresholds.
    pub fn classify(&self, confidence: f64, activity: f64) -> ResponseType {
        classify_levels(confidence, activity, self.low, self.high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_are_strict() {
        let t = Thresholds::default();
        assert_eq!(t.classify(0.7, 0.0), ResponseType::ThresholdExceeded);
        assert_eq!(t.classify(0.3, 0.0), ResponseType::NormalActivity);
        assert_eq!(t.classify(0.71, 0.0), ResponseType::SeizureDetected);
        assert_eq!(t.classify(0.31, 0.0), ResponseType::ThresholdExceeded);
    }

    #[test]
    fn either_level_can_trigger() {
        let t = Thresholds::default();
        assert_eq!(t.classify(0.1, 0.9), ResponseType::SeizureDetected);
        assert_eq!(t.classify(0.9, 0.1), ResponseType::SeizureDetected);
        assert_eq!(t.classify(0.0, 0.5), ResponseType::ThresholdExceeded);
        assert_eq!(t.classify(0.0, 0.0), ResponseType::NormalActivity);
    }

    #[test]
    fn inverted_thresholds_still_classify() {
        let t = Thresholds::new(0.8, 0.2);
        assert!(!t.is_ordered());
        // Anything above `high` wins before `low` is consulted.
        assert_eq!(t.classify(0.5, 0.0), ResponseType::SeizureDetected);
        assert_eq!(t.classify(0.1, 0.0), ResponseType::NormalActivity);
    }
}
