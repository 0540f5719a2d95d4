//! Segment layout constants, header and cell types, and block geometry.

use std::sync::atomic::AtomicU32;

use crate::error::{Result, TelemetryError};

/// Magic number of a live segment ("INTA").
pub const MAGIC: u32 = 0x494E_5441;

/// Magic written by the producer when it retires a segment.
pub const RETIRED_MAGIC: u32 = 0;

/// Well-known backing file of the segment.
pub const DEFAULT_SEGMENT_PATH: &str = "/dev/shm/intan_rhx_shm_v1";

/// Samples per block used by the acquisition software.
pub const DEFAULT_SAMPLES_PER_BLOCK: u32 = 128;

/// Size of [`SegmentHeader`] in bytes.
pub const HEADER_SIZE: usize = 24;

/// Size of [`SampleCell`] in bytes.
pub const CELL_SIZE: usize = 12;

/// Size of the sequence trailer in bytes.
pub const TRAILER_SIZE: usize = 4;

/// Segment header.
///
/// Layout (24 bytes total):
/// - magic: AtomicU32 (4 bytes), cleared on retirement
/// - timestamp: AtomicU32 (4 bytes), last written field of a publish
/// - data_size: u32 (4 bytes), payload bytes
/// - stream_count: u32 (4 bytes)
/// - channel_count: u32 (4 bytes)
/// - sample_rate: u32 (4 bytes)
///
/// Only `magic` and `timestamp` change after creation.
#[repr(C)]
pub(crate) struct SegmentHeader {
    pub(crate) magic: AtomicU32,
    pub(crate) timestamp: AtomicU32,
    pub(crate) data_size: u32,
    pub(crate) stream_count: u32,
    pub(crate) channel_count: u32,
    pub(crate) sample_rate: u32,
}

const _: () = assert!(
    std::mem::size_of::<SegmentHeader>() == HEADER_SIZE,
    "SegmentHeader size must equal HEADER_SIZE (24 bytes)"
);

/// One physical sample as stored in the payload region.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SampleCell {
    /// Acquisition stream index
    pub stream_id: u32,
    /// Channel index within the stream
    pub channel_id: u32,
    /// Sample value in microvolts
    pub value: f32,
}

const _: () = assert!(
    std::mem::size_of::<SampleCell>() == CELL_SIZE,
    "SampleCell size must equal CELL_SIZE (12 bytes)"
);

/// Shape of a telemetry block, fixed when the segment is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentGeometry {
    /// Number of acquisition streams
    pub stream_count: u32,
    /// Channels per stream
    pub channel_count: u32,
    /// Samples per channel in one block
    pub samples_per_block: u32,
    /// Acquisition sample rate in Hz
    pub sample_rate: u32,
}

impl SegmentGeometry {
    /// Validate and build a geometry. All dimensions must be non-zero and
    /// the payload must fit the 32-bit `data_size` header field.
    pub fn new(
        stream_count: u32,
        channel_count: u32,
        samples_per_block: u32,
        sample_rate: u32,
    ) -> Result<Self> {
        if stream_count == 0 || channel_count == 0 || samples_per_block == 0 {
            return Err(TelemetryError::InvalidGeometry(format!(
                "dimensions must be non-zero (streams={stream_count}, channels={channel_count}, samples={samples_per_block})"
            )));
        }
        let geometry = Self {
            stream_count,
            channel_count,
            samples_per_block,
            sample_rate,
        };
        if u32::try_from(geometry.payload_bytes()).is_err() {
            return Err(TelemetryError::InvalidGeometry(format!(
                "payload of {} bytes exceeds the 32-bit size field",
                geometry.payload_bytes()
            )));
        }
        Ok(geometry)
    }

    /// Number of cells in one block.
    pub fn cell_count(&self) -> usize {
        self.stream_count as usize * self.channel_count as usize * self.samples_per_block as usize
    }

    /// Payload bytes (the header's `data_size`).
    pub fn payload_bytes(&self) -> usize {
        self.cell_count() * CELL_SIZE
    }

    /// Offset of the sequence trailer.
    pub(crate) fn trailer_offset(&self) -> usize {
        HEADER_SIZE + self.payload_bytes()
    }

    /// Total segment size including header and trailer.
    pub fn segment_bytes(&self) -> usize {
        self.trailer_offset() + TRAILER_SIZE
    }

    /// Index of a cell in the payload. Cells are ordered by sample, then
    /// stream, then channel.
    pub fn cell_index(&self, sample: usize, stream: usize, channel: usize) -> usize {
        (sample * self.stream_count as usize + stream) * self.channel_count as usize + channel
    }

    /// Recover the geometry from header fields. Returns `None` when
    /// `data_size` is not a whole number of blocks.
    pub(crate) fn from_header(
        data_size: u32,
        stream_count: u32,
        channel_count: u32,
        sample_rate: u32,
    ) -> Option<Self> {
        let per_sample = (stream_count as usize).checked_mul(channel_count as usize)?;
        if per_sample == 0 || data_size as usize % (per_sample * CELL_SIZE) != 0 {
            return None;
        }
        let samples = data_size as usize / (per_sample * CELL_SIZE);
        Some(Self {
            stream_count,
            channel_count,
            samples_per_block: u32::try_from(samples).ok()?,
            sample_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_sizes() {
        let g = SegmentGeometry::new(2, 32, 128, 30_000).unwrap();
        assert_eq!(g.cell_count(), 8192);
        assert_eq!(g.payload_bytes(), 8192 * 12);
        assert_eq!(g.segment_bytes(), 24 + 8192 * 12 + 4);
    }

    #[test]
    fn cell_order_is_sample_stream_channel() {
        let g = SegmentGeometry::new(2, 3, 4, 1000).unwrap();
        assert_eq!(g.cell_index(0, 0, 0), 0);
        assert_eq!(g.cell_index(0, 0, 2), 2);
        assert_eq!(g.cell_index(0, 1, 0), 3);
        assert_eq!(g.cell_index(1, 0, 0), 6);
        assert_eq!(g.cell_index(3, 1, 2), g.cell_count() - 1);
    }

    #[test]
    fn zero_dimensions_rejected() {
        assert!(SegmentGeometry::new(0, 32, 128, 1000).is_err());
        assert!(SegmentGeometry::new(1, 0, 128, 1000).is_err());
        assert!(SegmentGeometry::new(1, 32, 0, 1000).is_err());
    }

    #[test]
    fn header_round_trip() {
        let g = SegmentGeometry::new(2, 32, 128, 20_000).unwrap();
        let recovered = SegmentGeometry::from_header(
            g.payload_bytes() as u32,
            g.stream_count,
            g.channel_count,
            g.sample_rate,
        );
        assert_eq!(recovered, Some(g));
        assert_eq!(SegmentGeometry::from_header(13, 1, 1, 0), None);
        assert_eq!(SegmentGeometry::from_header(120, 0, 1, 0), None);
    }
}
