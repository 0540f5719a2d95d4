//! Partition reader.
//!
//! Reconstructs classification rows from any of the row layouts ever
//! written, and extracts single-channel time series for review.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use halo_core::{ResponseType, Thresholds};

use crate::container::{read_partition, RawPartition};
use crate::error::{Result, StorageError};
use crate::layout::RowLayout;
use crate::schema::{PartitionSchema, NEURAL_CHANNELS, STREAM_COUNT_ATTR};

/// Where a row's timestamp came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimestampSource {
    /// Persisted with the row
    Recorded,
    /// Estimated as one second per row counted back from open time
    Approximated,
}

/// One classification row recovered from a partition.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRow {
    /// Position within the partition
    pub row_index: usize,
    /// When the row was classified
    pub timestamp: DateTime<Utc>,
    /// Whether `timestamp` was stored or estimated
    pub timestamp_source: TimestampSource,
    /// Label re-derived from confidence and activity
    pub response_type: ResponseType,
    /// Label stored by the writer, for layouts that persist one
    pub stored_type: Option<ResponseType>,
    /// Raw first response byte
    pub raw_byte: u8,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Activity level in [0, 1]
    pub activity_level: f64,
    /// Secondary metric
    pub secondary_metric: f64,
    /// Neural channel with the largest absolute value
    pub channel_of_interest: usize,
    /// Human-readable summary
    pub description: String,
}

/// Read-only view of one partition.
///
/// The whole partition is loaded at open; any number of readers may open
/// the same file.
#[derive(Debug, Clone)]
pub struct PartitionReader {
    path: PathBuf,
    raw: RawPartition,
    layout: RowLayout,
    opened_at: DateTime<Utc>,
    thresholds: Thresholds,
}

impl PartitionReader {
    /// Open and load `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_at(path, Utc::now())
    }

    /// Open `path`, using `opened_at` as the reference for approximated
    /// timestamps.
    pub fn open_at(path: impl AsRef<Path>, opened_at: DateTime<Utc>) -> Result<Self> {
        let path = path.as_ref();
        let raw = read_partition(path)?;
        let layout = RowLayout::from_column_count(raw.signals);
        debug!(
            path = %path.display(),
            rows = raw.rows(),
            signals = raw.signals,
            ?layout,
            "Opened partition for reading"
        );
        Ok(Self {
            path: path.to_path_buf(),
            raw,
            layout,
            opened_at,
            thresholds: Thresholds::default(),
        })
    }

    /// Use `thresholds` when re-deriving response types.
    #[must_use]
    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Partition file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Row layout recognised from the column count.
    pub fn layout(&self) -> RowLayout {
        self.layout
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.raw.rows()
    }

    /// Columns per row.
    pub fn signal_count(&self) -> usize {
        self.raw.signals
    }

    /// Whether rows carry stored timestamps.
    pub fn has_timestamps(&self) -> bool {
        self.raw.timestamps.is_some()
    }

    /// Header stored with the partition.
    pub fn read_header(&self) -> Result<PartitionSchema> {
        self.raw.schema.ok_or_else(|| StorageError::MissingAttribute {
            path: self.path.clone(),
            attribute: self.raw.missing_attribute.unwrap_or(STREAM_COUNT_ATTR),
        })
    }

    /// Decode every row, oldest first.
    pub fn read_all_rows(&self) -> Vec<DetectionRow> {
        (0..self.raw.rows()).map(|i| self.decode_row(i)).collect()
    }

    fn decode_row(&self, row_index: usize) -> DetectionRow {
        let (codes, values) = self.raw.row(row_index);
        let decoded = self.layout.decode(codes, values);

        let recorded = self
            .raw
            .timestamps
            .as_ref()
            .and_then(|ts| ts.get(row_index))
            .map(|&ns| DateTime::from_timestamp_nanos(ns));
        let (timestamp, timestamp_source) = match recorded {
            Some(ts) => (ts, TimestampSource::Recorded),
            None => (
                self.opened_at - Duration::seconds(row_index as i64),
                TimestampSource::Approximated,
            ),
        };

        DetectionRow {
            row_index,
            timestamp,
            timestamp_source,
            response_type: self
                .thresholds
                .classify(decoded.confidence, decoded.activity_level),
            stored_type: decoded.stored_type,
            raw_byte: decoded.raw_byte,
            confidence: decoded.confidence,
            activity_level: decoded.activity_level,
            secondary_metric: decoded.secondary_metric,
            channel_of_interest: decoded.channel_of_interest,
            description: format!(
                "Confidence: {:.3}, Activity: {:.3}",
                decoded.confidence, decoded.activity_level
            ),
        }
    }

    /// Physical values of column `index` across all rows.
    ///
    /// Empty when `index` is not below 32, below the header's channel
    /// count and below the stored column count. Legacy and minimal files
    /// answer for any column they hold, metadata included.
    pub fn read_channel(&self, index: usize) -> Vec<f32> {
        let channels = self
            .raw
            .schema
            .map_or(self.raw.signals, |schema| schema.channel_count as usize);
        if index >= NEURAL_CHANNELS || index >= channels || index >= self.raw.signals {
            return Vec::new();
        }
        (0..self.raw.rows())
            .map(|row| self.raw.row(row).1[index])
            .collect()
    }
}
