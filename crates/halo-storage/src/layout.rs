//! Row packing and column-count based row decoding.
//!
//! A classification row holds the neural channels of the original waveform
//! followed by four metadata slots:
//!
//! | slot | code                      | value                         |
//! |------|---------------------------|-------------------------------|
//! | +0   | raw first response byte   | secondary metric              |
//! | +1   | response type id          | sub-millisecond time fraction |
//! | +2   | `confidence * 65535`      | confidence                    |
//! | +3   | `activity * 1000`         | activity level                |
//!
//! No schema version is persisted, so readers recognise older archives by
//! their column count alone. Those thresholds must stay exactly as they are
//! for existing files to keep decoding.

use halo_core::units::waveform_byte_to_microvolts;
use halo_core::{ClassificationRecord, ResponseType};

use crate::schema::{METADATA_SLOTS, NEURAL_CHANNELS};

/// Neural channels in the legacy row layout.
pub const LEGACY_NEURAL_CHANNELS: usize = 28;

/// A packed row ready for [`PartitionWriter::append_frame`](crate::PartitionWriter::append_frame).
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// 16-bit codes, one per signal
    pub codes: Vec<u16>,
    /// Physical values, one per signal
    pub values: Vec<f32>,
}

/// Packs classification records into rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    neural_channels: usize,
}

impl Default for FrameLayout {
    fn default() -> Self {
        Self::new(NEURAL_CHANNELS)
    }
}

impl FrameLayout {
    /// Layout with `neural_channels` channels ahead of the metadata slots.
    pub fn new(neural_channels: usize) -> Self {
        Self { neural_channels }
    }

    /// Neural channels per row.
    pub fn neural_channels(&self) -> usize {
        self.neural_channels
    }

    /// Signals per row.
    pub fn signal_count(&self) -> usize {
        self.neural_channels + METADATA_SLOTS
    }

    /// Pack `record` with the waveform bytes the processor was given.
    ///
    /// Neural channel `i` stores waveform byte `i` as `byte << 8` and
    /// `byte * 8 - 1000` µV; channels beyond the waveform stay zero.
    pub fn pack(&self, waveform: &[u8], record: &ClassificationRecord) -> Frame {
        let mut codes = vec![0u16; self.signal_count()];
        let mut values = vec![0f32; self.signal_count()];

        for (i, &byte) in waveform.iter().take(self.neural_channels).enumerate() {
            codes[i] = u16::from(byte) << 8;
            values[i] = waveform_byte_to_microvolts(byte);
        }

        let m = self.neural_channels;
        codes[m] = u16::from(record.raw_byte);
        values[m] = record.secondary_metric as f32;

        codes[m + 1] = record.response_type.id();
        values[m + 1] = record.timestamp_fraction() as f32;

        // Float to int casts saturate, so out-of-range levels clamp
        codes[m + 2] = (record.confidence * 65535.0) as u16;
        values[m + 2] = record.confidence as f32;

        codes[m + 3] = (record.activity_level * 1000.0) as u16;
        values[m + 3] = record.activity_level as f32;

        Frame { codes, values }
    }
}

/// Row layout recognised from a partition's column count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowLayout {
    /// 36 or more columns: neural `[0,32)`, metadata `[32,36)`
    Current,
    /// 32 to 35 columns: neural `[0,28)`, metadata `[28,32)`
    Legacy,
    /// 3 to 31 columns: confidence, activity, secondary metric at `[0,3)`
    Minimal,
    /// Fewer than 3 columns: one value used as both confidence and activity
    Degenerate,
}

/// Metadata recovered from one stored row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedRow {
    /// Raw first response byte
    pub raw_byte: u8,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Activity level in [0, 1]
    pub activity_level: f64,
    /// Secondary metric
    pub secondary_metric: f64,
    /// Response type persisted by the writer, when the layout stores one
    pub stored_type: Option<ResponseType>,
    /// Neural channel with the largest absolute value
    pub channel_of_interest: usize,
}

impl RowLayout {
    /// Layout for a row of `columns` signals.
    pub fn from_column_count(columns: usize) -> Self {
        match columns {
            c if c >= NEURAL_CHANNELS + METADATA_SLOTS => RowLayout::Current,
            c if c >= NEURAL_CHANNELS => RowLayout::Legacy,
            c if c >= 3 => RowLayout::Minimal,
            _ => RowLayout::Degenerate,
        }
    }

    /// Neural channels available in this layout.
    pub fn neural_channels(self) -> usize {
        match self {
            RowLayout::Current => NEURAL_CHANNELS,
            RowLayout::Legacy => LEGACY_NEURAL_CHANNELS,
            RowLayout::Minimal | RowLayout::Degenerate => 0,
        }
    }

    /// Decode one row. `codes` and `values` must have the same length, the
    /// column count this layout was chosen for.
    pub fn decode(self, codes: &[u16], values: &[f32]) -> DecodedRow {
        let value = |i: usize| values.get(i).copied().map_or(0.0, f64::from);
        let code = |i: usize| codes.get(i).copied().unwrap_or(0);

        match self {
            RowLayout::Current | RowLayout::Legacy => {
                let m = self.neural_channels();
                DecodedRow {
                    raw_byte: (code(m) & 0xFF) as u8,
                    confidence: value(m + 2),
                    activity_level: value(m + 3),
                    secondary_metric: value(m),
                    stored_type: ResponseType::from_id(code(m + 1)),
                    channel_of_interest: loudest_channel(&values[..m.min(values.len())]),
                }
            }
            RowLayout::Minimal => DecodedRow {
                raw_byte: (code(0) & 0xFF) as u8,
                confidence: value(0),
                activity_level: value(1),
                secondary_metric: value(2),
                stored_type: None,
                channel_of_interest: 0,
            },
            RowLayout::Degenerate => DecodedRow {
                raw_byte: (code(0) & 0xFF) as u8,
                confidence: value(0),
                activity_level: value(0),
                secondary_metric: 0.0,
                stored_type: None,
                channel_of_interest: 0,
            },
        }
    }
}

/// Index of the largest absolute value; the first wins ties and an all-zero
/// row maps to channel 0.
fn loudest_channel(neural: &[f32]) -> usize {
    let mut best = 0;
    let mut max = 0.0f32;
    for (i, v) in neural.iter().enumerate() {
        if v.abs() > max {
            max = v.abs();
            best = i;
        }
    }
    best
}
