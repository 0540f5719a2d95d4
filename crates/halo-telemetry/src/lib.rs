//! Shared-memory telemetry channel.
//!
//! One producer (the acquisition process) publishes fixed-size blocks of
//! physical samples into a memory-mapped segment; any number of consumers
//! (the analysis stage) poll the most recent block without blocking the
//! producer. The segment keeps only the latest block: consumers that fall
//! behind miss blocks, they never stall acquisition.
//!
//! # Segment layout
//!
//! ```text
//! offset 0   magic        u32  0x494E5441 ("INTA"), 0 once retired
//!        4   timestamp    u32  producer block timestamp
//!        8   data_size    u32  payload bytes
//!       12   stream_count u32
//!       16   channel_count u32
//!       20   sample_rate  u32
//!       24   payload      [SampleCell; samples * streams * channels]
//!            sequence     u32  seqlock counter, odd while a block is written
//! ```
//!
//! All fields are native-endian. The header and payload are bit-compatible
//! with existing readers of the segment; the trailing sequence counter lets
//! consumers discard reads that overlapped a publish.
//!
//! # Example
//! ```no_run
//! use halo_telemetry::{BlockRead, SegmentGeometry, TelemetryConsumer, TelemetryProducer};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let path = Path::new("/dev/shm/intan_rhx_shm_v1");
//! let geometry = SegmentGeometry::new(1, 2, 4, 30_000)?;
//! let mut producer = TelemetryProducer::create(path, geometry)?;
//! producer.publish_block(&[vec![vec![32768; 4], vec![32868; 4]]], 1)?;
//!
//! let mut consumer = TelemetryConsumer::open(path)?;
//! if let BlockRead::Fresh(block) = consumer.read_latest_block() {
//!     println!("{} waveform bytes", block.waveform().len());
//! }
//! producer.destroy()?;
//! # Ok(())
//! # }
//! ```

pub mod consumer;
pub mod error;
pub mod layout;
pub mod poller;
pub mod producer;
mod segment;

pub use consumer::{BlockRead, TelemetryBlock, TelemetryConsumer};
pub use error::{Result, TelemetryError};
pub use layout::{SampleCell, SegmentGeometry, DEFAULT_SEGMENT_PATH, MAGIC};
pub use poller::{spawn_poller, PollerStats};
pub use producer::TelemetryProducer;
