//! Partition header and container naming.

use std::collections::HashMap;

/// Name of the codes array.
pub const CODES_ARRAY: &str = "samples_codes";

/// Name of the physical values array.
pub const VALUES_ARRAY: &str = "samples_uV";

/// Name of the per-row timestamp array (nanoseconds since the Unix epoch).
pub const TIMESTAMPS_ARRAY: &str = "timestamps_ns";

/// Header attribute holding the stream count.
pub const STREAM_COUNT_ATTR: &str = "streamCount";

/// Header attribute holding the channel count.
pub const CHANNEL_COUNT_ATTR: &str = "channelCount";

/// Header attribute holding the sample rate.
pub const SAMPLE_RATE_ATTR: &str = "sampleRate";

/// Neural channels in the current row layout.
pub const NEURAL_CHANNELS: usize = halo_core::config::NEURAL_CHANNELS as usize;

/// Metadata slots following the neural channels.
pub const METADATA_SLOTS: usize = 4;

/// Partition header recorded as container metadata.
///
/// Every row of a partition holds `stream_count * channel_count` signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartitionSchema {
    /// Number of streams
    pub stream_count: u32,
    /// Signals per stream
    pub channel_count: u32,
    /// Nominal row rate in Hz
    pub sample_rate: u32,
}

impl PartitionSchema {
    /// Build a header.
    pub fn new(stream_count: u32, channel_count: u32, sample_rate: u32) -> Self {
        Self {
            stream_count,
            channel_count,
            sample_rate,
        }
    }

    /// Header for classification rows: one stream holding `neural_channels`
    /// neural values followed by the metadata slots.
    pub fn for_classification_rows(neural_channels: u32, sample_rate: u32) -> Self {
        Self::new(1, neural_channels + METADATA_SLOTS as u32, sample_rate)
    }

    /// Header for the current 32-channel layout at 1 kHz.
    pub fn current() -> Self {
        Self::for_classification_rows(NEURAL_CHANNELS as u32, 1000)
    }

    /// Signals per row.
    pub fn signal_count(&self) -> usize {
        self.stream_count as usize * self.channel_count as usize
    }

    /// Header as string key/value metadata.
    pub fn to_metadata(&self) -> HashMap<String, String> {
        HashMap::from([
            (STREAM_COUNT_ATTR.to_string(), self.stream_count.to_string()),
            (CHANNEL_COUNT_ATTR.to_string(), self.channel_count.to_string()),
            (SAMPLE_RATE_ATTR.to_string(), self.sample_rate.to_string()),
        ])
    }

    /// Parse a header from string metadata. Returns the name of the first
    /// missing or malformed attribute on failure.
    pub fn from_metadata(metadata: &HashMap<String, String>) -> Result<Self, &'static str> {
        let field = |name: &'static str| {
            metadata
                .get(name)
                .and_then(|v| v.parse::<u32>().ok())
                .ok_or(name)
        };
        Ok(Self {
            stream_count: field(STREAM_COUNT_ATTR)?,
            channel_count: field(CHANNEL_COUNT_ATTR)?,
            sample_rate: field(SAMPLE_RATE_ATTR)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_schema_has_metadata_slots() {
        let schema = PartitionSchema::current();
        assert_eq!(schema.stream_count, 1);
        assert_eq!(schema.channel_count, 36);
        assert_eq!(schema.sample_rate, 1000);
        assert_eq!(schema.signal_count(), 36);
    }

    #[test]
    fn metadata_round_trip() {
        let schema = PartitionSchema::new(2, 18, 500);
        assert_eq!(PartitionSchema::from_metadata(&schema.to_metadata()), Ok(schema));

        let mut metadata = schema.to_metadata();
        metadata.remove(SAMPLE_RATE_ATTR);
        assert_eq!(PartitionSchema::from_metadata(&metadata), Err(SAMPLE_RATE_ATTR));
        metadata.insert(SAMPLE_RATE_ATTR.to_string(), "fast".to_string());
        assert_eq!(PartitionSchema::from_metadata(&metadata), Err(SAMPLE_RATE_ATTR));
    }
}
