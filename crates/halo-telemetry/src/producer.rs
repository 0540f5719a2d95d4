#![allow(unsafe_code)]
//! Producer side of the telemetry channel.

use memmap2::MmapOptions;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

use halo_core::units::code_to_microvolts;

use crate::error::{Result, TelemetryError};
use crate::layout::{SampleCell, SegmentGeometry, RETIRED_MAGIC};
use crate::segment::MappedSegment;

/// Owner of a telemetry segment.
///
/// The producer creates the segment, is its only writer and removes it when
/// destroyed or dropped. Consumers attached at that point observe the
/// retired magic and report the segment as unavailable.
#[derive(Debug)]
pub struct TelemetryProducer {
    segment: MappedSegment,
    blocks_published: u64,
    destroyed: bool,
}

impl TelemetryProducer {
    /// Create the segment at `path`, replacing any stale segment left by a
    /// previous producer.
    ///
    /// Creation failure is fatal for the caller; on any error the partially
    /// created backing file is removed.
    pub fn create(path: &Path, geometry: SegmentGeometry) -> Result<Self> {
        // Re-validate: the fields are public and may bypass `new`.
        let geometry = SegmentGeometry::new(
            geometry.stream_count,
            geometry.channel_count,
            geometry.samples_per_block,
            geometry.sample_rate,
        )?;
        let create_err = |source| TelemetryError::SegmentCreateFailed {
            path: path.to_path_buf(),
            source,
        };

        match fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "Removed stale telemetry segment"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(create_err(e)),
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(create_err)?;

        let mapped = file
            .set_len(geometry.segment_bytes() as u64)
            // SAFETY: we created the file above and sized it to segment_bytes;
            // only this producer writes to it.
            .and_then(|()| unsafe { MmapOptions::new().map_mut(&file) });
        let mmap = match mapped {
            Ok(mmap) => mmap,
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(path) {
                    warn!(path = %path.display(), error = %cleanup, "Failed to remove partial segment");
                }
                return Err(create_err(e));
            }
        };

        // SAFETY: the mapping is exactly segment_bytes long
        let segment = unsafe { MappedSegment::writable(path, mmap, geometry) };
        // `new` guarantees the payload fits in u32
        segment.initialise(geometry.payload_bytes() as u32);

        info!(
            path = %path.display(),
            streams = geometry.stream_count,
            channels = geometry.channel_count,
            samples = geometry.samples_per_block,
            bytes = geometry.segment_bytes(),
            "Created telemetry segment"
        );

        Ok(Self {
            segment,
            blocks_published: 0,
            destroyed: false,
        })
    }

    /// Geometry fixed at creation.
    pub fn geometry(&self) -> SegmentGeometry {
        self.segment.geometry()
    }

    /// Backing file of the segment.
    pub fn path(&self) -> &Path {
        self.segment.path()
    }

    /// Number of blocks published so far.
    pub fn blocks_published(&self) -> u64 {
        self.blocks_published
    }

    /// Publish one block of raw ADC codes, indexed `[stream][channel][sample]`.
    ///
    /// Codes are converted to microvolts and stored in sample, stream,
    /// channel order. The header timestamp is the last field written, so a
    /// consumer never pairs a new timestamp with an old payload.
    pub fn publish_block(&mut self, codes: &[Vec<Vec<i32>>], timestamp: u32) -> Result<()> {
        let cells = self.convert_block(codes)?;

        let sequence = self.segment.sequence();
        // Odd = write in progress. AcqRel keeps the payload stores below it.
        sequence.fetch_add(1, Ordering::AcqRel);
        self.segment.write_cells(&cells);
        self.segment
            .header()
            .timestamp
            .store(timestamp, Ordering::Release);
        // Even = block complete
        sequence.fetch_add(1, Ordering::Release);

        self.blocks_published += 1;
        Ok(())
    }

    fn convert_block(&self, codes: &[Vec<Vec<i32>>]) -> Result<Vec<SampleCell>> {
        let g = self.segment.geometry();
        check_dim("streams", g.stream_count as usize, codes.len())?;
        for stream in codes {
            check_dim("channels", g.channel_count as usize, stream.len())?;
            for channel in stream {
                check_dim("samples", g.samples_per_block as usize, channel.len())?;
            }
        }

        let mut cells = vec![SampleCell::default(); g.cell_count()];
        for (stream_id, stream) in codes.iter().enumerate() {
            for (channel_id, samples) in stream.iter().enumerate() {
                for (sample, &code) in samples.iter().enumerate() {
                    cells[g.cell_index(sample, stream_id, channel_id)] = SampleCell {
                        stream_id: stream_id as u32,
                        channel_id: channel_id as u32,
                        value: code_to_microvolts(code),
                    };
                }
            }
        }
        Ok(cells)
    }

    /// Retire and remove the segment.
    pub fn destroy(mut self) -> Result<()> {
        self.retire()
    }

    fn retire(&mut self) -> Result<()> {
        if self.destroyed {
            return Ok(());
        }
        self.destroyed = true;
        self.segment
            .header()
            .magic
            .store(RETIRED_MAGIC, Ordering::Release);
        match fs::remove_file(self.segment.path()) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        info!(
            path = %self.segment.path().display(),
            blocks = self.blocks_published,
            "Destroyed telemetry segment"
        );
        Ok(())
    }
}

impl Drop for TelemetryProducer {
    fn drop(&mut self) {
        if let Err(e) = self.retire() {
            warn!(error = %e, "Failed to destroy telemetry segment on drop");
        }
    }
}

fn check_dim(dimension: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(TelemetryError::BlockShape {
            dimension,
            expected,
            found,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{HEADER_SIZE, MAGIC};
    use tempfile::tempdir;

    fn read_u32(bytes: &[u8], offset: usize) -> u32 {
        u32::from_ne_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn header_is_bit_exact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("segment");
        let geometry = SegmentGeometry::new(2, 3, 4, 20_000).unwrap();
        let mut producer = TelemetryProducer::create(&path, geometry).unwrap();
        producer
            .publish_block(&vec![vec![vec![32768; 4]; 3]; 2], 77)
            .unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), geometry.segment_bytes());
        assert_eq!(read_u32(&bytes, 0), MAGIC);
        assert_eq!(read_u32(&bytes, 4), 77);
        assert_eq!(read_u32(&bytes, 8), (2 * 3 * 4 * 12) as u32);
        assert_eq!(read_u32(&bytes, 12), 2);
        assert_eq!(read_u32(&bytes, 16), 3);
        assert_eq!(read_u32(&bytes, 20), 20_000);
        // Sequence trailer is even after a completed publish
        assert_eq!(read_u32(&bytes, geometry.trailer_offset()), 2);
    }

    #[test]
    fn cells_are_ordered_sample_stream_channel() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("segment");
        let geometry = SegmentGeometry::new(2, 2, 2, 1000).unwrap();
        let mut producer = TelemetryProducer::create(&path, geometry).unwrap();
        // stream 1, channel 0, sample 1 is 100 codes above midpoint
        let mut codes = vec![vec![vec![32768; 2]; 2]; 2];
        codes[1][0][1] = 32868;
        producer.publish_block(&codes, 1).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let index = geometry.cell_index(1, 1, 0);
        let offset = HEADER_SIZE + index * 12;
        assert_eq!(read_u32(&bytes, offset), 1);
        assert_eq!(read_u32(&bytes, offset + 4), 0);
        let value = f32::from_ne_bytes(bytes[offset + 8..offset + 12].try_into().unwrap());
        assert!((value - 19.5).abs() < 1e-4);
    }

    #[test]
    fn wrong_shape_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("segment");
        let geometry = SegmentGeometry::new(1, 2, 4, 1000).unwrap();
        let mut producer = TelemetryProducer::create(&path, geometry).unwrap();

        let err = producer
            .publish_block(&[vec![vec![0; 4]; 3]], 1)
            .unwrap_err();
        assert!(matches!(
            err,
            TelemetryError::BlockShape {
                dimension: "channels",
                expected: 2,
                found: 3
            }
        ));
        let err = producer.publish_block(&[vec![vec![0; 5]; 2]], 1).unwrap_err();
        assert!(matches!(err, TelemetryError::BlockShape { dimension: "samples", .. }));
        assert_eq!(producer.blocks_published(), 0);
    }

    #[test]
    fn create_replaces_stale_segment() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("segment");
        std::fs::write(&path, b"stale").unwrap();

        let geometry = SegmentGeometry::new(1, 1, 1, 1000).unwrap();
        let _producer = TelemetryProducer::create(&path, geometry).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), geometry.segment_bytes());
        assert_eq!(read_u32(&bytes, 0), MAGIC);
    }

    #[test]
    fn create_fails_in_missing_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("segment");
        let geometry = SegmentGeometry::new(1, 1, 1, 1000).unwrap();
        let err = TelemetryProducer::create(&path, geometry).unwrap_err();
        assert!(matches!(err, TelemetryError::SegmentCreateFailed { .. }));
    }

    #[test]
    fn destroy_and_drop_remove_the_segment() {
        let dir = tempdir().unwrap();
        let geometry = SegmentGeometry::new(1, 1, 1, 1000).unwrap();

        let path = dir.path().join("destroyed");
        let producer = TelemetryProducer::create(&path, geometry).unwrap();
        producer.destroy().unwrap();
        assert!(!path.exists());

        let path = dir.path().join("dropped");
        {
            let _producer = TelemetryProducer::create(&path, geometry).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }
}
