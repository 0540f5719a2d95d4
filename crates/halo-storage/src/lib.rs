//! Time-partitioned store for classified responses.
//!
//! Each row holds the neural channel values that were sent for processing
//! followed by the classifier's metadata (see [`layout`]). Rows land in one
//! partition per calendar date and hour:
//!
//! ```text
//! <root>/<YYYY-MM-DD>/hour_HH.arrows   Arrow IPC stream (default)
//! <root>/<YYYY-MM-DD>/hour_HH.h5       HDF5, with the `storage_hdf5` feature
//! ```
//!
//! Every append is durable before it returns. Readers recognise every row
//! layout ever written by its column count.
//!
//! # Example
//! ```no_run
//! use halo_storage::{FrameLayout, HourlyPartitions, PartitionFormat, PartitionReader, PartitionSchema};
//! # use halo_core::{ClassificationRecord, Pipeline, ResponseType};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let record = ClassificationRecord {
//! #     timestamp: chrono::Utc::now(),
//! #     response_type: ResponseType::NormalActivity,
//! #     pipeline: Pipeline::LzLic,
//! #     raw_byte: 0,
//! #     description: String::new(),
//! #     confidence: 0.1,
//! #     activity_level: 0.1,
//! #     secondary_metric: 0.0,
//! # };
//! let mut store = HourlyPartitions::new("logs", PartitionSchema::current(), PartitionFormat::Arrow, 1024);
//! let frame = FrameLayout::default().pack(&[128; 32], &record);
//! let key = store.append(&frame)?;
//! let path = store.path_for(key);
//! store.close()?;
//!
//! for row in PartitionReader::open(path)?.read_all_rows() {
//!     println!("{} {}", row.timestamp, row.response_type);
//! }
//! # Ok(())
//! # }
//! ```

pub mod catalog;
mod container;
pub mod error;
pub mod layout;
pub mod partitions;
pub mod reader;
pub mod schema;
pub mod summary;
pub mod writer;

pub use catalog::{scan_archive, PartitionEntry};
pub use container::format_of;
pub use error::{Result, StorageError};
pub use halo_core::config::PartitionFormat;
pub use layout::{DecodedRow, Frame, FrameLayout, RowLayout};
pub use partitions::{HourlyPartitions, PartitionKey};
pub use reader::{DetectionRow, PartitionReader, TimestampSource};
pub use schema::PartitionSchema;
pub use summary::{latest_for_channel, DetectionSummary};
pub use writer::PartitionWriter;
