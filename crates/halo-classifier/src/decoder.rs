//! Response decoding.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use halo_core::{ClassificationRecord, Pipeline, ResponseType, Thresholds};

use crate::metrics::{activity_level, is_test_pattern};

/// Description of a test-pattern response.
pub const TEST_PATTERN_DESCRIPTION: &str = "Test pattern detected - sequential counter data";

/// Description of a response from a topology without an analysis rule.
pub const UNSUPPORTED_DESCRIPTION: &str = "Unsupported pipeline";

/// Description of an empty response.
pub const EMPTY_DESCRIPTION: &str = "Empty response buffer";

/// Stateful classifier for processor responses.
///
/// Holds the active topology and threshold pair; both can be changed between
/// decodes. Decoding itself never fails: every input yields a record.
#[derive(Debug, Clone, Default)]
pub struct ResponseClassifier {
    pipeline: Pipeline,
    thresholds: Thresholds,
}

impl ResponseClassifier {
    /// Classifier for topology 0 with thresholds 0.3 / 0.7.
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifier with an explicit topology and thresholds.
    pub fn with_config(pipeline: Pipeline, thresholds: Thresholds) -> Self {
        Self {
            pipeline,
            thresholds,
        }
    }

    /// Active topology.
    pub fn pipeline(&self) -> Pipeline {
        self.pipeline
    }

    /// Active thresholds.
    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Select the topology used for subsequent decodes.
    pub fn set_pipeline(&mut self, pipeline: Pipeline) {
        debug!(pipeline = pipeline.id(), topology = pipeline.topology(), "Pipeline selected");
        self.pipeline = pipeline;
    }

    /// Replace the thresholds. Inverted pairs are applied as given.
    pub fn set_thresholds(&mut self, low: f64, high: f64) {
        let thresholds = Thresholds::new(low, high);
        if !thresholds.is_ordered() {
            warn!(low, high, "Low threshold is not below high threshold");
        }
        self.thresholds = thresholds;
    }

    /// Classify `data`, stamped with the current time.
    pub fn decode(&self, data: &[u8]) -> ClassificationRecord {
        self.decode_at(data, Utc::now())
    }

    /// Classify `data` with an explicit timestamp.
    pub fn decode_at(&self, data: &[u8], timestamp: DateTime<Utc>) -> ClassificationRecord {
        let mut record = ClassificationRecord {
            timestamp,
            response_type: ResponseType::ProcessingError,
            pipeline: self.pipeline,
            raw_byte: data.first().copied().unwrap_or(0),
            description: String::new(),
            confidence: 0.0,
            activity_level: 0.0,
            secondary_metric: 0.0,
        };

        if data.is_empty() {
            record.description = EMPTY_DESCRIPTION.to_string();
            return record;
        }

        if is_test_pattern(data) {
            record.response_type = ResponseType::TestPattern;
            record.description = TEST_PATTERN_DESCRIPTION.to_string();
            record.confidence = 1.0;
            return record;
        }

        let Some(profile) = self.pipeline.profile() else {
            record.response_type = ResponseType::Unknown;
            record.description = UNSUPPORTED_DESCRIPTION.to_string();
            return record;
        };

        let activity = activity_level(data);
        let response_type = self.thresholds.classify(activity, activity);
        record.description = match response_type {
            ResponseType::SeizureDetected => {
                format!("High activity detected in {} pipeline", profile.label)
            }
            ResponseType::ThresholdExceeded => {
                format!("Elevated activity in {} pipeline", profile.label)
            }
            _ => format!("Normal activity in {} pipeline", profile.label),
        };
        record.response_type = response_type;
        record.confidence = activity;
        record.activity_level = activity;
        record.secondary_metric = data.len() as f64 / profile.secondary_divisor;
        record
    }
}
