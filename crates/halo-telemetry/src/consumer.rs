#![allow(unsafe_code)]
//! Consumer side of the telemetry channel.

use memmap2::MmapOptions;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::atomic::{fence, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use halo_core::units::microvolts_to_waveform_byte;

use crate::error::{Result, TelemetryError};
use crate::layout::{SampleCell, SegmentGeometry, HEADER_SIZE, MAGIC};
use crate::segment::MappedSegment;

const MAX_RETRIES: usize = 100;
const MAX_RETRY_DURATION: Duration = Duration::from_millis(100);

/// A consistent copy of one published block.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryBlock {
    /// Producer timestamp of the block
    pub timestamp: u32,
    /// Block shape
    pub geometry: SegmentGeometry,
    /// Physical samples in sample, stream, channel order
    pub cells: Vec<SampleCell>,
}

impl TelemetryBlock {
    /// One byte per cell, in cell order, quantised for the processor.
    pub fn waveform(&self) -> Vec<u8> {
        self.cells
            .iter()
            .map(|cell| microvolts_to_waveform_byte(cell.value))
            .collect()
    }

    /// Cell at (sample, stream, channel), if in range.
    pub fn cell(&self, sample: usize, stream: usize, channel: usize) -> Option<&SampleCell> {
        let g = &self.geometry;
        if sample >= g.samples_per_block as usize
            || stream >= g.stream_count as usize
            || channel >= g.channel_count as usize
        {
            return None;
        }
        self.cells.get(g.cell_index(sample, stream, channel))
    }
}

/// Outcome of polling the segment.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockRead {
    /// A block newer than the last one returned
    Fresh(TelemetryBlock),
    /// Nothing published since the last read, or the read kept overlapping
    /// a publish
    NoNewData,
    /// The producer retired the segment
    Unavailable,
}

/// Read-only attachment to a telemetry segment.
#[derive(Debug)]
pub struct TelemetryConsumer {
    segment: MappedSegment,
    last_timestamp: Option<u32>,
}

impl TelemetryConsumer {
    /// Attach to an existing segment.
    ///
    /// Fails when the segment does not exist, is not live, or its header
    /// does not describe the mapped length.
    pub fn open(path: &Path) -> Result<Self> {
        let unavailable = |source| TelemetryError::SegmentUnavailable {
            path: path.to_path_buf(),
            source,
        };
        let file = OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(unavailable)?;
        // SAFETY: the mapping is only read through atomic loads and byte
        // copies whose bounds are validated against the header below.
        let mmap = unsafe { MmapOptions::new().map(&file) }.map_err(unavailable)?;

        let len = mmap.len() as u64;
        if mmap.len() < HEADER_SIZE {
            return Err(TelemetryError::SegmentTooSmall {
                path: path.to_path_buf(),
                len,
                required: HEADER_SIZE as u64,
            });
        }

        let field = |offset: usize| {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&mmap[offset..offset + 4]);
            u32::from_ne_bytes(raw)
        };
        let magic = field(0);
        if magic != MAGIC {
            return Err(TelemetryError::InvalidMagic {
                path: path.to_path_buf(),
                found: magic,
                expected: MAGIC,
            });
        }
        let (data_size, streams, channels, rate) = (field(8), field(12), field(16), field(20));
        let geometry = SegmentGeometry::from_header(data_size, streams, channels, rate)
            .ok_or_else(|| TelemetryError::CorruptHeader {
                path: path.to_path_buf(),
                reason: format!(
                    "data_size {data_size} is not a whole block of {streams}x{channels} cells"
                ),
            })?;
        if mmap.len() < geometry.segment_bytes() {
            return Err(TelemetryError::SegmentTooSmall {
                path: path.to_path_buf(),
                len,
                required: geometry.segment_bytes() as u64,
            });
        }

        debug!(
            path = %path.display(),
            streams,
            channels,
            samples = geometry.samples_per_block,
            "Attached to telemetry segment"
        );

        Ok(Self {
            // SAFETY: length validated against the header geometry above
            segment: unsafe { MappedSegment::read_only(path, mmap, geometry) },
            last_timestamp: None,
        })
    }

    /// Geometry advertised by the segment header.
    pub fn geometry(&self) -> SegmentGeometry {
        self.segment.geometry()
    }

    /// Backing file of the segment.
    pub fn path(&self) -> &Path {
        self.segment.path()
    }

    /// Whether the producer still owns the segment.
    pub fn is_live(&self) -> bool {
        self.segment.header().magic.load(Ordering::Acquire) == MAGIC
    }

    /// Copy the most recent block if it is newer than the last one returned.
    ///
    /// Never blocks on the producer: a read that keeps overlapping publishes
    /// gives up after a bounded number of retries and reports no new data,
    /// leaving the block to be picked up by the next poll.
    pub fn read_latest_block(&mut self) -> BlockRead {
        if !self.is_live() {
            return BlockRead::Unavailable;
        }

        let header = self.segment.header();
        let sequence = self.segment.sequence();

        // Cheap pre-check outside the seqlock
        let published = header.timestamp.load(Ordering::Acquire);
        if self.last_timestamp == Some(published) {
            return BlockRead::NoNewData;
        }

        let start = Instant::now();
        for retry in 0..MAX_RETRIES {
            if start.elapsed() > MAX_RETRY_DURATION {
                error!(
                    path = %self.segment.path().display(),
                    "Telemetry read timed out, producer may have stopped mid-publish"
                );
                return BlockRead::NoNewData;
            }

            let before = sequence.load(Ordering::Acquire);
            if before == 0 {
                // Created but nothing published yet
                return BlockRead::NoNewData;
            }
            if before % 2 != 0 {
                backoff(retry);
                continue;
            }

            let cells = self.segment.copy_cells();
            let timestamp = header.timestamp.load(Ordering::Relaxed);

            // Order the payload loads before re-reading the sequence
            fence(Ordering::SeqCst);
            let after = sequence.load(Ordering::Acquire);

            if before == after {
                if self.last_timestamp == Some(timestamp) {
                    return BlockRead::NoNewData;
                }
                self.last_timestamp = Some(timestamp);
                return BlockRead::Fresh(TelemetryBlock {
                    timestamp,
                    geometry: self.segment.geometry(),
                    cells,
                });
            }
            backoff(retry);
        }

        warn!(
            retries = MAX_RETRIES,
            "Telemetry read exceeded retries due to publish contention"
        );
        BlockRead::NoNewData
    }
}

fn backoff(retry: usize) {
    if retry < 10 {
        std::hint::spin_loop();
    } else {
        std::thread::yield_now();
    }
}
