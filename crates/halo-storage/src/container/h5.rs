//! HDF5 container (`.h5`).
//!
//! Two extendable `rows × signals` datasets with the header as `u32`
//! attributes on each, plus a one-dimensional timestamp dataset. Archives
//! from before per-row timestamps existed have no timestamp dataset and are
//! read without it.

use std::path::{Path, PathBuf};

use hdf5::{Dataset, File, H5Type};
use tracing::{debug, warn};

use super::{ContainerWriter, CreationGuard, RawPartition};
use crate::error::{Result, StorageError};
use crate::schema::{
    PartitionSchema, CHANNEL_COUNT_ATTR, CODES_ARRAY, SAMPLE_RATE_ATTR, STREAM_COUNT_ATTR,
    TIMESTAMPS_ARRAY, VALUES_ARRAY,
};

/// Open HDF5 partition accepting appends.
pub(crate) struct Hdf5Container {
    path: PathBuf,
    file: File,
    codes: Dataset,
    values: Dataset,
    timestamps: Dataset,
    signals: usize,
    rows: u64,
}

impl Hdf5Container {
    /// Create a new partition at `path`. Fails if the file already exists.
    pub(crate) fn create(path: &Path, header: &PartitionSchema, chunk_rows: usize) -> Result<Self> {
        let file = File::create_excl(path).map_err(|e| StorageError::from(e).creating(path))?;
        let guard = CreationGuard::new(path);
        let container = Self::build(path, file, header, chunk_rows.max(1)).map_err(|e| e.creating(path))?;
        guard.disarm();
        debug!(path = %path.display(), signals = container.signals, "Created HDF5 partition");
        Ok(container)
    }

    fn build(path: &Path, file: File, header: &PartitionSchema, chunk_rows: usize) -> Result<Self> {
        let signals = header.signal_count();
        let codes = signal_dataset::<u16>(&file, CODES_ARRAY, header, chunk_rows)?;
        let values = signal_dataset::<f32>(&file, VALUES_ARRAY, header, chunk_rows)?;
        let timestamps = file
            .new_dataset::<i64>()
            .chunk(chunk_rows)
            .shape(0..)
            .create(TIMESTAMPS_ARRAY)?;
        file.flush()?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            codes,
            values,
            timestamps,
            signals,
            rows: 0,
        })
    }

    /// Reopen an existing partition for appending.
    pub(crate) fn resume(path: &Path, header: &PartitionSchema) -> Result<Self> {
        let file = File::open_rw(path)?;
        let incompatible = |reason: String| StorageError::Incompatible {
            path: path.to_path_buf(),
            reason,
        };

        let codes = file
            .dataset(CODES_ARRAY)
            .map_err(|_| incompatible(format!("missing '{CODES_ARRAY}' dataset")))?;
        let values = file
            .dataset(VALUES_ARRAY)
            .map_err(|_| incompatible(format!("missing '{VALUES_ARRAY}' dataset")))?;
        let timestamps = file
            .dataset(TIMESTAMPS_ARRAY)
            .map_err(|_| incompatible(format!("missing '{TIMESTAMPS_ARRAY}' dataset")))?;

        let signals = header.signal_count();
        let shape = codes.shape();
        if shape.len() != 2 || shape[1] != signals || values.shape() != shape {
            return Err(incompatible(format!(
                "datasets have shape {shape:?}, writer expects {signals} signals per row"
            )));
        }
        let rows = shape[0];
        if timestamps.shape() != [rows] {
            return Err(incompatible(format!(
                "'{TIMESTAMPS_ARRAY}' does not have {rows} entries"
            )));
        }

        debug!(path = %path.display(), rows, "Resumed HDF5 partition");
        Ok(Self {
            path: path.to_path_buf(),
            file,
            codes,
            values,
            timestamps,
            signals,
            rows: rows as u64,
        })
    }

    fn write_row(&self, row: usize, codes: &[u16], values: &[f32], timestamp_ns: i64) -> Result<()> {
        self.codes.resize((row + 1, self.signals))?;
        self.values.resize((row + 1, self.signals))?;
        self.timestamps.resize(row + 1)?;
        self.codes.write_slice(codes, (row, ..))?;
        self.values.write_slice(values, (row, ..))?;
        self.timestamps.write_slice(&[timestamp_ns], row..row + 1)?;
        self.file.flush()?;
        Ok(())
    }

    fn shrink_to(&self, rows: usize) {
        let restored = self
            .codes
            .resize((rows, self.signals))
            .and_then(|()| self.values.resize((rows, self.signals)))
            .and_then(|()| self.timestamps.resize(rows))
            .and_then(|()| self.file.flush());
        if let Err(e) = restored {
            warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to roll back partial append"
            );
        }
    }
}

fn signal_dataset<T: H5Type>(
    file: &File,
    name: &str,
    header: &PartitionSchema,
    chunk_rows: usize,
) -> Result<Dataset> {
    let signals = header.signal_count();
    let dataset = file
        .new_dataset::<T>()
        .chunk((chunk_rows, signals))
        .shape((0.., signals))
        .create(name)?;
    for (attr, value) in [
        (STREAM_COUNT_ATTR, header.stream_count),
        (CHANNEL_COUNT_ATTR, header.channel_count),
        (SAMPLE_RATE_ATTR, header.sample_rate),
    ] {
        dataset.new_attr::<u32>().create(attr)?.write_scalar(&value)?;
    }
    Ok(dataset)
}

impl ContainerWriter for Hdf5Container {
    fn append(&mut self, codes: &[u16], values: &[f32], timestamp_ns: i64) -> Result<()> {
        let row = self.rows as usize;
        if let Err(e) = self.write_row(row, codes, values, timestamp_ns) {
            self.shrink_to(row);
            return Err(e);
        }
        self.rows += 1;
        Ok(())
    }

    fn rows(&self) -> u64 {
        self.rows
    }

    fn close(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}

/// Read a whole HDF5 partition.
pub(crate) fn read(path: &Path) -> Result<RawPartition> {
    let file = File::open(path)?;
    let incompatible = |reason: String| StorageError::Incompatible {
        path: path.to_path_buf(),
        reason,
    };

    let codes_ds = file
        .dataset(CODES_ARRAY)
        .map_err(|_| incompatible(format!("missing '{CODES_ARRAY}' dataset")))?;
    let values_ds = file
        .dataset(VALUES_ARRAY)
        .map_err(|_| incompatible(format!("missing '{VALUES_ARRAY}' dataset")))?;

    let shape = values_ds.shape();
    if shape.len() != 2 || codes_ds.shape() != shape {
        return Err(incompatible(format!(
            "'{VALUES_ARRAY}' has shape {shape:?}, '{CODES_ARRAY}' has {:?}",
            codes_ds.shape()
        )));
    }

    let attr = |name: &'static str| {
        values_ds
            .attr(name)
            .and_then(|a| a.read_scalar::<u32>())
            .map_err(|_| name)
    };
    let header = (|| -> std::result::Result<PartitionSchema, &'static str> {
        Ok(PartitionSchema::new(
            attr(STREAM_COUNT_ATTR)?,
            attr(CHANNEL_COUNT_ATTR)?,
            attr(SAMPLE_RATE_ATTR)?,
        ))
    })();
    let (schema, missing_attribute) = match header {
        Ok(header) => (Some(header), None),
        Err(name) => (None, Some(name)),
    };

    let timestamps = match file.dataset(TIMESTAMPS_ARRAY) {
        Ok(ds) => Some(ds.read_raw::<i64>()?),
        Err(_) => None,
    };

    Ok(RawPartition {
        schema,
        missing_attribute,
        signals: shape[1],
        codes: codes_ds.read_raw::<u16>()?,
        values: values_ds.read_raw::<f32>()?,
        timestamps,
    })
}
