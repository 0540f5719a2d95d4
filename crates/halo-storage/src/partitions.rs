//! Hourly partition dispatch.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate, TimeZone, Timelike, Utc};
use tracing::{info, warn};

use halo_core::config::{PartitionFormat, StorageConfig};

use crate::error::{Result, StorageError};
use crate::layout::{Frame, FrameLayout};
use crate::schema::PartitionSchema;
use crate::writer::PartitionWriter;

/// Calendar date and hour of day a partition covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKey {
    /// Calendar date
    pub date: NaiveDate,
    /// Hour of day, 0 to 23
    pub hour: u32,
}

impl PartitionKey {
    /// Key for `date` and `hour`, or `None` if `hour > 23`.
    pub fn new(date: NaiveDate, hour: u32) -> Option<Self> {
        (hour < 24).then_some(Self { date, hour })
    }

    /// Key covering `at`, in `at`'s own time zone.
    pub fn containing<Tz: TimeZone>(at: &DateTime<Tz>) -> Self {
        Self {
            date: at.date_naive(),
            hour: at.hour(),
        }
    }

    /// `<YYYY-MM-DD>/hour_HH.<ext>`
    pub fn relative_path(&self, format: PartitionFormat) -> PathBuf {
        Path::new(&self.date.format("%Y-%m-%d").to_string())
            .join(format!("hour_{:02}.{}", self.hour, format.extension()))
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} hour {:02}", self.date.format("%Y-%m-%d"), self.hour)
    }
}

/// Owns every open partition writer of a run, one per (date, hour).
///
/// Partitions open lazily on the first row of their hour and stay open for
/// the rest of the day. When a row arrives for a later date, every writer of
/// earlier dates is closed and those dates are retired.
#[derive(Debug)]
pub struct HourlyPartitions {
    root: PathBuf,
    format: PartitionFormat,
    schema: PartitionSchema,
    chunk_rows: usize,
    writers: BTreeMap<PartitionKey, PartitionWriter>,
    current_date: Option<NaiveDate>,
    rows_written: u64,
}

impl HourlyPartitions {
    /// Dispatcher writing `schema` rows under `root`.
    pub fn new(
        root: impl Into<PathBuf>,
        schema: PartitionSchema,
        format: PartitionFormat,
        chunk_rows: usize,
    ) -> Self {
        Self {
            root: root.into(),
            format,
            schema,
            chunk_rows,
            writers: BTreeMap::new(),
            current_date: None,
            rows_written: 0,
        }
    }

    /// Dispatcher for the configured store. Expects a configuration that
    /// passed `HaloConfig::validate`.
    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(
            &config.root_dir,
            PartitionSchema::for_classification_rows(config.neural_channels, config.sample_rate),
            config.format,
            config.chunk_rows,
        )
    }

    /// Row packing matching this store's schema.
    pub fn frame_layout(&self) -> FrameLayout {
        FrameLayout::new(self.schema.signal_count().saturating_sub(crate::schema::METADATA_SLOTS))
    }

    /// Archive root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the partition for `key`.
    pub fn path_for(&self, key: PartitionKey) -> PathBuf {
        self.root.join(key.relative_path(self.format))
    }

    /// Number of partitions currently open.
    pub fn open_partitions(&self) -> usize {
        self.writers.len()
    }

    /// Keys of the open partitions, oldest first.
    pub fn open_keys(&self) -> impl Iterator<Item = PartitionKey> + '_ {
        self.writers.keys().copied()
    }

    /// Rows appended through this dispatcher.
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Append `frame` to the partition of the current local hour.
    pub fn append(&mut self, frame: &Frame) -> Result<PartitionKey> {
        self.append_at(frame, &Local::now())
    }

    /// Append `frame` to the partition covering `at`. The partition is
    /// chosen from `at`'s wall clock; the stored timestamp is `at` itself.
    pub fn append_at<Tz: TimeZone>(&mut self, frame: &Frame, at: &DateTime<Tz>) -> Result<PartitionKey> {
        let key = PartitionKey::containing(at);

        match self.current_date {
            Some(current) if key.date < current => {
                return Err(StorageError::PartitionRetired {
                    partition: key.to_string(),
                });
            }
            Some(current) if key.date > current => self.retire_before(key.date),
            _ => {}
        }
        self.current_date = Some(key.date);

        if !self.writers.contains_key(&key) {
            let path = self.path_for(key);
            let writer = PartitionWriter::open_with(&path, self.schema, self.format, self.chunk_rows)?;
            info!(partition = %key, path = %path.display(), "Opened hourly partition");
            self.writers.insert(key, writer);
        }

        if let Some(writer) = self.writers.get(&key) {
            writer.append(frame, at.with_timezone(&Utc))?;
            self.rows_written += 1;
        }
        Ok(key)
    }

    /// Close every writer dated before `date`. A failed close is logged and
    /// does not block rows for the new date.
    fn retire_before(&mut self, date: NaiveDate) {
        let keep = self.writers.split_off(&PartitionKey { date, hour: 0 });
        let retired = std::mem::replace(&mut self.writers, keep);
        if retired.is_empty() {
            return;
        }
        info!(before = %date, partitions = retired.len(), "Retiring partitions of earlier dates");
        if let Err(e) = close_all(retired) {
            warn!(before = %date, error = %e, "Retired partitions did not all close cleanly");
        }
    }

    /// Close every open partition.
    pub fn close(mut self) -> Result<()> {
        close_all(std::mem::take(&mut self.writers))
    }
}

fn close_all(writers: BTreeMap<PartitionKey, PartitionWriter>) -> Result<()> {
    let mut first_error = None;
    for (key, writer) in writers {
        if let Err(e) = writer.close() {
            warn!(partition = %key, error = %e, "Failed to close partition");
            if first_error.is_none() {
                first_error = Some(e);
            }
        }
    }
    first_error.map_or(Ok(()), Err)
}
