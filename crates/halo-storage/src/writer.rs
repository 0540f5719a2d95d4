//! Append-only partition writer.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use halo_core::config::PartitionFormat;

use crate::container::{self, ContainerWriter};
use crate::error::{Result, StorageError};
use crate::layout::Frame;
use crate::schema::PartitionSchema;

/// Rows per storage chunk when none is configured.
pub const DEFAULT_CHUNK_ROWS: usize = 1024;

/// One open partition.
///
/// Appends are serialised by an internal lock and each row is durable
/// before [`append_frame`](Self::append_frame) returns. A failed append
/// leaves no partial row behind.
pub struct PartitionWriter {
    path: PathBuf,
    schema: PartitionSchema,
    format: PartitionFormat,
    container: Mutex<Box<dyn ContainerWriter>>,
    closed: bool,
}

impl std::fmt::Debug for PartitionWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionWriter")
            .field("path", &self.path)
            .field("schema", &self.schema)
            .field("format", &self.format)
            .field("rows", &self.row_count())
            .finish()
    }
}

impl PartitionWriter {
    /// Open `path`, inferring the format from its extension.
    pub fn open(path: impl AsRef<Path>, schema: PartitionSchema) -> Result<Self> {
        let path = path.as_ref();
        let format = container::format_of(path).ok_or_else(|| StorageError::UnsupportedFormat {
            path: path.to_path_buf(),
        })?;
        Self::open_with(path, schema, format, DEFAULT_CHUNK_ROWS)
    }

    /// Open `path` as a `format` container.
    ///
    /// Missing parent directories are created. An existing compatible
    /// container is resumed after its last row.
    pub fn open_with(
        path: impl AsRef<Path>,
        schema: PartitionSchema,
        format: PartitionFormat,
        chunk_rows: usize,
    ) -> Result<Self> {
        let path = path.as_ref();
        if schema.signal_count() == 0 {
            return Err(StorageError::Incompatible {
                path: path.to_path_buf(),
                reason: "schema has no signals".to_string(),
            });
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StorageError::from(e).creating(path))?;
        }

        let container = container::open_writer(path, format, &schema, chunk_rows)?;
        info!(
            path = %path.display(),
            ?format,
            signals = schema.signal_count(),
            rows = container.rows(),
            "Opened partition"
        );

        Ok(Self {
            path: path.to_path_buf(),
            schema,
            format,
            container: Mutex::new(container),
            closed: false,
        })
    }

    /// Partition file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Header fixed at open.
    pub fn schema(&self) -> PartitionSchema {
        self.schema
    }

    /// Container format.
    pub fn format(&self) -> PartitionFormat {
        self.format
    }

    /// Rows committed so far.
    pub fn row_count(&self) -> u64 {
        self.container.lock().rows()
    }

    /// Append one row stamped with the current time.
    pub fn append_frame(&self, codes: &[u16], values: &[f32]) -> Result<()> {
        self.append_frame_at(codes, values, Utc::now())
    }

    /// Append one row stamped with `timestamp`.
    pub fn append_frame_at(
        &self,
        codes: &[u16],
        values: &[f32],
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let expected = self.schema.signal_count();
        if codes.len() != expected || values.len() != expected {
            return Err(StorageError::SignalCountMismatch {
                expected,
                codes: codes.len(),
                values: values.len(),
            });
        }
        let timestamp_ns = timestamp.timestamp_nanos_opt().unwrap_or(i64::MAX);

        let mut container = self.container.lock();
        container.append(codes, values, timestamp_ns)?;
        debug!(path = %self.path.display(), row = container.rows() - 1, "Appended row");
        Ok(())
    }

    /// Append a packed [`Frame`].
    pub fn append(&self, frame: &Frame, timestamp: DateTime<Utc>) -> Result<()> {
        self.append_frame_at(&frame.codes, &frame.values, timestamp)
    }

    /// Flush and close the partition.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        let rows = self.row_count();
        self.container.get_mut().close()?;
        info!(path = %self.path.display(), rows, "Closed partition");
        Ok(())
    }
}

impl Drop for PartitionWriter {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.container.get_mut().close() {
            warn!(path = %self.path.display(), error = %e, "Failed to close partition on drop");
        }
    }
}
