//! Error types for the partition store.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur when writing or reading partitions.
#[derive(Error, Debug)]
pub enum StorageError {
    /// A partition file or its directory could not be created
    #[error("Failed to create partition '{}': {source}", path.display())]
    CreateFailed {
        /// Partition path
        path: PathBuf,
        /// Underlying cause
        #[source]
        source: Box<StorageError>,
    },

    /// An existing file cannot be appended to or read as a partition
    #[error("Incompatible partition '{}': {reason}", path.display())]
    Incompatible {
        /// Partition path
        path: PathBuf,
        /// What does not match
        reason: String,
    },

    /// The partition header has no value for a required attribute
    #[error("Partition '{}' has no '{attribute}' attribute", path.display())]
    MissingAttribute {
        /// Partition path
        path: PathBuf,
        /// Attribute name
        attribute: &'static str,
    },

    /// A row does not have the partition's fixed signal count
    #[error("Row has {codes} codes and {values} values, partition expects {expected}")]
    SignalCountMismatch {
        /// Signal count fixed at open
        expected: usize,
        /// Codes supplied
        codes: usize,
        /// Values supplied
        values: usize,
    },

    /// A row was addressed to a partition whose day has already been closed
    #[error("Partition {partition} was already closed")]
    PartitionRetired {
        /// `YYYY-MM-DD hour HH`
        partition: String,
    },

    /// The file extension does not name a supported container format
    #[error("Unsupported partition format: '{}'", path.display())]
    UnsupportedFormat {
        /// Partition path
        path: PathBuf,
    },

    /// I/O error from the operating system
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow encoding or decoding error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// HDF5 library error
    #[cfg(feature = "storage_hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),
}

impl StorageError {
    /// Wrap `self` as the cause of a failed partition creation.
    pub(crate) fn creating(self, path: impl Into<PathBuf>) -> Self {
        match self {
            // Already describes the file
            err @ (StorageError::CreateFailed { .. } | StorageError::Incompatible { .. }) => err,
            other => StorageError::CreateFailed {
                path: path.into(),
                source: Box::new(other),
            },
        }
    }
}
