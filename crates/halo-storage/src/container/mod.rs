//! Container formats backing a partition.
//!
//! Every format stores the same three arrays (codes, values, per-row
//! timestamps) plus the header; the writer and reader only see the
//! [`ContainerWriter`] trait and [`RawPartition`].

pub(crate) mod arrow_ipc;
#[cfg(feature = "storage_hdf5")]
pub(crate) mod h5;

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::warn;

use halo_core::config::PartitionFormat;

use crate::error::{Result, StorageError};
use crate::schema::PartitionSchema;

/// Append side of a container.
pub(crate) trait ContainerWriter: Send {
    /// Append one row and make it durable. On error the container is left
    /// exactly as it was before the call.
    fn append(&mut self, codes: &[u16], values: &[f32], timestamp_ns: i64) -> Result<()>;

    /// Rows committed so far, including rows present when the container was
    /// resumed.
    fn rows(&self) -> u64;

    /// Flush and finalise. No appends are accepted afterwards.
    fn close(&mut self) -> Result<()>;
}

/// Full contents of a partition.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawPartition {
    /// Header, if every attribute is present
    pub(crate) schema: Option<PartitionSchema>,
    /// Name of the first missing header attribute
    pub(crate) missing_attribute: Option<&'static str>,
    /// Columns per row
    pub(crate) signals: usize,
    /// Row-major codes
    pub(crate) codes: Vec<u16>,
    /// Row-major values
    pub(crate) values: Vec<f32>,
    /// Per-row timestamps, absent in archives written before they existed
    pub(crate) timestamps: Option<Vec<i64>>,
}

impl RawPartition {
    pub(crate) fn rows(&self) -> usize {
        if self.signals == 0 {
            self.values.len()
        } else {
            self.values.len() / self.signals
        }
    }

    pub(crate) fn row(&self, index: usize) -> (&[u16], &[f32]) {
        let start = index * self.signals;
        let end = start + self.signals;
        (&self.codes[start..end], &self.values[start..end])
    }
}

/// Create a new container, or resume appending to an existing compatible
/// one.
pub(crate) fn open_writer(
    path: &Path,
    format: PartitionFormat,
    schema: &PartitionSchema,
    chunk_rows: usize,
) -> Result<Box<dyn ContainerWriter>> {
    let exists = path.try_exists()?;
    match format {
        PartitionFormat::Arrow => {
            let container = if exists {
                arrow_ipc::ArrowContainer::resume(path, schema)?
            } else {
                arrow_ipc::ArrowContainer::create(path, schema)?
            };
            Ok(Box::new(container))
        }
        #[cfg(feature = "storage_hdf5")]
        PartitionFormat::Hdf5 => {
            let container = if exists {
                h5::Hdf5Container::resume(path, schema)?
            } else {
                h5::Hdf5Container::create(path, schema, chunk_rows)?
            };
            Ok(Box::new(container))
        }
        #[cfg(not(feature = "storage_hdf5"))]
        PartitionFormat::Hdf5 => {
            let _ = chunk_rows;
            Err(StorageError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
        }
    }
}

/// Load a container, choosing the format from the file extension.
pub(crate) fn read_partition(path: &Path) -> Result<RawPartition> {
    match format_of(path) {
        Some(PartitionFormat::Arrow) => arrow_ipc::read(path),
        #[cfg(feature = "storage_hdf5")]
        Some(PartitionFormat::Hdf5) => h5::read(path),
        _ => Err(StorageError::UnsupportedFormat {
            path: path.to_path_buf(),
        }),
    }
}

/// Format implied by a path's extension.
pub fn format_of(path: &Path) -> Option<PartitionFormat> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(PartitionFormat::from_extension)
}

/// Removes a file unless disarmed. Wraps every multi-step creation so a
/// half-built container never survives an error path.
pub(crate) struct CreationGuard {
    path: PathBuf,
    armed: bool,
}

impl CreationGuard {
    pub(crate) fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            armed: true,
        }
    }

    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CreationGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => warn!(path = %self.path.display(), "Removed partially created partition"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove partially created partition"
            ),
        }
    }
}
