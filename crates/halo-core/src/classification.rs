//! Response types, processing topologies and classification records.
//!
//! The numeric ids in this module are persisted in partition files, so they
//! must never be renumbered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::HaloError;

/// Category assigned to a processor response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u16)]
pub enum ResponseType {
    /// Confidence or activity above the high threshold
    SeizureDetected = 0,
    /// Confidence and activity at or below the low threshold
    NormalActivity = 1,
    /// Confidence or activity above the low threshold only
    ThresholdExceeded = 2,
    /// The response could not be analysed
    ProcessingError = 3,
    /// The response is the processor's sequential counter self-test
    TestPattern = 4,
    /// The active topology has no analysis rule
    Unknown = 5,
}

impl ResponseType {
    /// Every response type, in id order.
    pub const ALL: [ResponseType; 6] = [
        ResponseType::SeizureDetected,
        ResponseType::NormalActivity,
        ResponseType::ThresholdExceeded,
        ResponseType::ProcessingError,
        ResponseType::TestPattern,
        ResponseType::Unknown,
    ];

    /// Stable on-disk id.
    pub fn id(self) -> u16 {
        self as u16
    }

    /// Look up a response type by its on-disk id.
    pub fn from_id(id: u16) -> Option<Self> {
        Self::ALL.get(usize::from(id)).copied()
    }

    /// Upper-snake-case label, e.g. `SEIZURE_DETECTED`.
    pub fn label(self) -> &'static str {
        match self {
            ResponseType::SeizureDetected => "SEIZURE_DETECTED",
            ResponseType::NormalActivity => "NORMAL_ACTIVITY",
            ResponseType::ThresholdExceeded => "THRESHOLD_EXCEEDED",
            ResponseType::ProcessingError => "PROCESSING_ERROR",
            ResponseType::TestPattern => "TEST_PATTERN",
            ResponseType::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ResponseType {
    type Err = HaloError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| HaloError::InvalidConfig(format!("Unknown response type '{s}'")))
    }
}

/// Analysis rule for a topology the classifier understands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineProfile {
    /// Short stage label used in descriptions, e.g. `LZ-LIC`
    pub label: &'static str,
    /// The secondary metric is `response length / divisor`
    pub secondary_divisor: f64,
}

/// Signal-processing graph selected on the processor.
///
/// Topologies 4, 5, 7 and 8 combine a detector branch with a compression
/// branch behind a gate; the classifier has no rule for them or for the
/// passthrough topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Pipeline {
    /// ADC -> LZ -> LIC -> Sink
    #[default]
    LzLic = 0,
    /// ADC -> LZ -> MA -> RC -> Sink
    LzMaRc = 1,
    /// ADC -> DWT -> TOK -> MA -> RC -> Sink
    DwtTokMaRc = 2,
    /// ADC -> Sink
    Passthrough = 3,
    /// NEO detector gating an LZ/LIC compressor
    NeoGateLzLic = 4,
    /// NEO detector gating an LZ/MA/RC compressor
    NeoGateLzMaRc = 5,
    /// NEO detector gating raw samples
    NeoThrGate = 6,
    /// DWT detector gating an LZ/LIC compressor
    DwtGateLzLic = 7,
    /// DWT detector gating an LZ/MA/RC compressor
    DwtGateLzMaRc = 8,
    /// DWT detector gating raw samples
    DwtThrGate = 9,
}

impl Pipeline {
    /// Every topology, in id order.
    pub const ALL: [Pipeline; 10] = [
        Pipeline::LzLic,
        Pipeline::LzMaRc,
        Pipeline::DwtTokMaRc,
        Pipeline::Passthrough,
        Pipeline::NeoGateLzLic,
        Pipeline::NeoGateLzMaRc,
        Pipeline::NeoThrGate,
        Pipeline::DwtGateLzLic,
        Pipeline::DwtGateLzMaRc,
        Pipeline::DwtThrGate,
    ];

    /// Numeric topology selector (0-9).
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Look up a topology by id.
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(usize::from(id)).copied()
    }

    /// Human-readable description of the processing graph.
    pub fn topology(self) -> &'static str {
        match self {
            Pipeline::LzLic => "ADC -> LZ -> LIC -> Sink",
            Pipeline::LzMaRc => "ADC -> LZ -> MA -> RC -> Sink",
            Pipeline::DwtTokMaRc => "ADC -> DWT -> TOK -> MA -> RC -> Sink",
            Pipeline::Passthrough => "ADC -> Sink",
            Pipeline::NeoGateLzLic => {
                "ADC_b -> NEO -> THR -> GATE, ADC_a -> LZ -> LIC -> GATE, GATE -> Sink"
            }
            Pipeline::NeoGateLzMaRc => {
                "ADC_b -> NEO -> THR -> GATE, ADC_a -> LZ -> MA -> RC -> GATE, GATE -> Sink"
            }
            Pipeline::NeoThrGate => "ADC_b -> NEO -> THR -> GATE, ADC_a -> GATE, GATE -> Sink",
            Pipeline::DwtGateLzLic => {
                "ADC_b -> DWT -> THR -> GATE, ADC_a -> LZ -> LIC -> GATE, GATE -> Sink"
            }
            Pipeline::DwtGateLzMaRc => {
                "ADC_b -> DWT -> THR -> GATE, ADC_a -> LZ -> MA -> RC -> GATE, GATE -> Sink"
            }
            Pipeline::DwtThrGate => "ADC_b -> DWT -> THR -> GATE, ADC_a -> GATE, GATE -> Sink",
        }
    }

    /// Analysis rule, or `None` when the classifier cannot interpret this
    /// topology's output.
    pub fn profile(self) -> Option<PipelineProfile> {
        let (label, secondary_divisor) = match self {
            Pipeline::LzLic => ("LZ-LIC", 8.0),
            Pipeline::LzMaRc => ("LZ-MA-RC", 8.0),
            Pipeline::DwtTokMaRc => ("DWT-TOK-MA-RC", 2.0),
            Pipeline::NeoThrGate => ("NEO-THR-GATE", 4.0),
            Pipeline::DwtThrGate => ("DWT-THR-GATE", 2.0),
            _ => return None,
        };
        Some(PipelineProfile {
            label,
            secondary_divisor,
        })
    }
}

impl TryFrom<u8> for Pipeline {
    type Error = HaloError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Self::from_id(id).ok_or(HaloError::UnknownPipeline(id))
    }
}

impl From<Pipeline> for u8 {
    fn from(pipeline: Pipeline) -> u8 {
        pipeline.id()
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id(), self.topology())
    }
}

/// Result of classifying one processor response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRecord {
    /// Wall-clock time the response was classified
    pub timestamp: DateTime<Utc>,
    /// Assigned category
    pub response_type: ResponseType,
    /// Topology active when the response was produced
    pub pipeline: Pipeline,
    /// First byte of the response, or 0 for an empty response
    pub raw_byte: u8,
    /// Human-readable summary
    pub description: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Activity level in [0, 1]
    pub activity_level: f64,
    /// Topology-specific secondary metric
    pub secondary_metric: f64,
}

impl ClassificationRecord {
    /// Description of the topology that produced this record.
    pub fn topology(&self) -> &'static str {
        self.pipeline.topology()
    }

    /// Sub-millisecond fraction of the timestamp: nanoseconds since the
    /// epoch modulo one million, scaled to [0, 1).
    pub fn timestamp_fraction(&self) -> f64 {
        f64::from(self.timestamp.timestamp_subsec_nanos() % 1_000_000) / 1e6
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn response_type_ids_are_stable() {
        assert_eq!(ResponseType::SeizureDetected.id(), 0);
        assert_eq!(ResponseType::NormalActivity.id(), 1);
        assert_eq!(ResponseType::ThresholdExceeded.id(), 2);
        assert_eq!(ResponseType::ProcessingError.id(), 3);
        assert_eq!(ResponseType::TestPattern.id(), 4);
        assert_eq!(ResponseType::Unknown.id(), 5);
        for t in ResponseType::ALL {
            assert_eq!(ResponseType::from_id(t.id()), Some(t));
        }
        assert_eq!(ResponseType::from_id(6), None);
    }

    #[test]
    fn response_type_labels_parse_back() {
        for t in ResponseType::ALL {
            assert_eq!(t.to_string().parse::<ResponseType>().unwrap(), t);
        }
        assert_eq!(
            "threshold_exceeded".parse::<ResponseType>().unwrap(),
            ResponseType::ThresholdExceeded
        );
        assert!("BOGUS".parse::<ResponseType>().is_err());
    }

    #[test]
    fn pipeline_profiles_cover_implemented_topologies() {
        let implemented: Vec<u8> = Pipeline::ALL
            .into_iter()
            .filter(|p| p.profile().is_some())
            .map(Pipeline::id)
            .collect();
        assert_eq!(implemented, vec![0, 1, 2, 6, 9]);
        assert_eq!(Pipeline::DwtTokMaRc.profile().unwrap().secondary_divisor, 2.0);
        assert_eq!(Pipeline::NeoThrGate.profile().unwrap().label, "NEO-THR-GATE");
    }

    #[test]
    fn pipeline_ids_round_trip_and_reject_out_of_range() {
        for p in Pipeline::ALL {
            assert_eq!(Pipeline::try_from(p.id()).unwrap(), p);
        }
        assert!(matches!(
            Pipeline::try_from(10),
            Err(HaloError::UnknownPipeline(10))
        ));
        assert_eq!(Pipeline::Passthrough.topology(), "ADC -> Sink");
    }

    #[test]
    fn timestamp_fraction_uses_sub_millisecond_nanos() {
        let ts = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let record = ClassificationRecord {
            timestamp: ts,
            response_type: ResponseType::NormalActivity,
            pipeline: Pipeline::LzLic,
            raw_byte: 0,
            description: String::new(),
            confidence: 0.0,
            activity_level: 0.0,
            secondary_metric: 0.0,
        };
        assert!((record.timestamp_fraction() - 0.456_789).abs() < 1e-9);
    }
}
