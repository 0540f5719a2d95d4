//! Arrow IPC stream container (`.arrows`).
//!
//! One record batch per row. The header lives in the schema metadata and is
//! repeated on both signal fields. Each append is encoded in memory and
//! written with a single `write_all`, so a failed append can be rolled back
//! by truncating to the last committed length. A stream cut short by a crash
//! still reads up to its last complete batch.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, Int64Array, PrimitiveArray, UInt16Array,
};
use arrow::datatypes::{
    ArrowPrimitiveType, DataType, Field, FieldRef, Float32Type, Schema, SchemaRef, UInt16Type,
};
use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;
use arrow::record_batch::RecordBatch;
use tracing::{debug, warn};

use super::{ContainerWriter, CreationGuard, RawPartition};
use crate::error::{Result, StorageError};
use crate::schema::{PartitionSchema, CODES_ARRAY, TIMESTAMPS_ARRAY, VALUES_ARRAY};

/// Open Arrow partition accepting appends.
pub(crate) struct ArrowContainer {
    path: PathBuf,
    file: File,
    schema: SchemaRef,
    encoder: StreamWriter<Vec<u8>>,
    signals: usize,
    rows: u64,
    committed_len: u64,
    closed: bool,
}

impl std::fmt::Debug for ArrowContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrowContainer")
            .field("path", &self.path)
            .field("signals", &self.signals)
            .field("rows", &self.rows)
            .field("committed_len", &self.committed_len)
            .finish_non_exhaustive()
    }
}

fn codes_item() -> FieldRef {
    Arc::new(Field::new("item", DataType::UInt16, false))
}

fn values_item() -> FieldRef {
    Arc::new(Field::new("item", DataType::Float32, false))
}

fn arrow_schema(header: &PartitionSchema) -> SchemaRef {
    let width = header.signal_count() as i32;
    let metadata = header.to_metadata();
    Arc::new(Schema::new_with_metadata(
        vec![
            Field::new(TIMESTAMPS_ARRAY, DataType::Int64, false),
            Field::new(CODES_ARRAY, DataType::FixedSizeList(codes_item(), width), false)
                .with_metadata(metadata.clone()),
            Field::new(VALUES_ARRAY, DataType::FixedSizeList(values_item(), width), false)
                .with_metadata(metadata.clone()),
        ],
        metadata,
    ))
}

/// Drain whatever the encoder has produced so far.
fn take_encoded(encoder: &mut StreamWriter<Vec<u8>>) -> Result<Vec<u8>> {
    encoder.flush()?;
    Ok(std::mem::take(encoder.get_mut()))
}

impl ArrowContainer {
    /// Create a new partition at `path`. Fails if the file already exists.
    pub(crate) fn create(path: &Path, header: &PartitionSchema) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| StorageError::from(e).creating(path))?;
        let guard = CreationGuard::new(path);
        let container = Self::start(path, file, header).map_err(|e| e.creating(path))?;
        guard.disarm();
        debug!(path = %path.display(), signals = container.signals, "Created Arrow partition");
        Ok(container)
    }

    /// Reopen an existing partition for appending.
    ///
    /// An IPC stream cannot be reopened once its end marker is written, so
    /// the committed rows are copied into a fresh stream beside the original
    /// which then atomically replaces it.
    pub(crate) fn resume(path: &Path, header: &PartitionSchema) -> Result<Self> {
        let existing = read(path)?;
        if existing.signals != header.signal_count() {
            return Err(StorageError::Incompatible {
                path: path.to_path_buf(),
                reason: format!(
                    "file has {} signals per row, writer expects {}",
                    existing.signals,
                    header.signal_count()
                ),
            });
        }
        let Some(timestamps) = existing.timestamps.as_deref() else {
            return Err(StorageError::Incompatible {
                path: path.to_path_buf(),
                reason: format!("missing '{TIMESTAMPS_ARRAY}' array"),
            });
        };

        let staging = staging_path(path);
        if staging.try_exists()? {
            fs::remove_file(&staging)?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staging)?;
        let guard = CreationGuard::new(&staging);

        let mut container = Self::start(&staging, file, header)?;
        let rows = existing.rows();
        if rows > 0 {
            let batch = container.encode_batch(&existing.codes, &existing.values, timestamps)?;
            container.commit(&batch)?;
            container.rows = rows as u64;
        }
        fs::rename(&staging, path)?;
        guard.disarm();
        container.path = path.to_path_buf();

        debug!(path = %path.display(), rows, "Resumed Arrow partition");
        Ok(container)
    }

    fn start(path: &Path, mut file: File, header: &PartitionSchema) -> Result<Self> {
        let schema = arrow_schema(header);
        let mut encoder = StreamWriter::try_new(Vec::new(), &schema)?;
        let head = take_encoded(&mut encoder)?;
        file.write_all(&head)?;
        file.sync_data()?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            schema,
            encoder,
            signals: header.signal_count(),
            rows: 0,
            committed_len: head.len() as u64,
            closed: false,
        })
    }

    fn encode_batch(&self, codes: &[u16], values: &[f32], timestamps: &[i64]) -> Result<RecordBatch> {
        let width = self.signals as i32;
        let codes = FixedSizeListArray::try_new(
            codes_item(),
            width,
            Arc::new(UInt16Array::from(codes.to_vec())),
            None,
        )?;
        let values = FixedSizeListArray::try_new(
            values_item(),
            width,
            Arc::new(Float32Array::from(values.to_vec())),
            None,
        )?;
        let timestamps = Int64Array::from(timestamps.to_vec());
        let columns: Vec<ArrayRef> = vec![Arc::new(timestamps), Arc::new(codes), Arc::new(values)];
        Ok(RecordBatch::try_new(Arc::clone(&self.schema), columns)?)
    }

    /// Encode and durably write one batch, or leave the file untouched.
    fn commit(&mut self, batch: &RecordBatch) -> Result<()> {
        if let Err(e) = self.encoder.write(batch) {
            self.encoder.get_mut().clear();
            return Err(e.into());
        }
        let bytes = take_encoded(&mut self.encoder)?;
        let written = self
            .file
            .write_all(&bytes)
            .and_then(|()| self.file.sync_data());
        if let Err(e) = written {
            self.rollback();
            return Err(e.into());
        }
        self.committed_len += bytes.len() as u64;
        Ok(())
    }

    fn rollback(&mut self) {
        let restored = self
            .file
            .set_len(self.committed_len)
            .and_then(|()| self.file.seek(SeekFrom::Start(self.committed_len)).map(|_| ()));
        if let Err(e) = restored {
            warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to roll back partial append"
            );
        }
    }
}

impl ContainerWriter for ArrowContainer {
    fn append(&mut self, codes: &[u16], values: &[f32], timestamp_ns: i64) -> Result<()> {
        let batch = self.encode_batch(codes, values, &[timestamp_ns])?;
        self.commit(&batch)?;
        self.rows += 1;
        Ok(())
    }

    fn rows(&self) -> u64 {
        self.rows
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.encoder.finish()?;
        let tail = take_encoded(&mut self.encoder)?;
        self.file.write_all(&tail)?;
        self.file.sync_all()?;
        Ok(())
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Read every complete row of an Arrow partition.
pub(crate) fn read(path: &Path) -> Result<RawPartition> {
    let file = File::open(path)?;
    let reader = StreamReader::try_new(BufReader::new(file), None)?;
    let schema = reader.schema();

    let (schema_header, missing_attribute) = match PartitionSchema::from_metadata(schema.metadata()) {
        Ok(header) => (Some(header), None),
        Err(attribute) => (None, Some(attribute)),
    };

    let width_of = |name: &str| match schema.field_with_name(name).map(|f| f.data_type()) {
        Ok(DataType::FixedSizeList(_, width)) => Ok(*width as usize),
        _ => Err(StorageError::Incompatible {
            path: path.to_path_buf(),
            reason: format!("missing fixed-width '{name}' array"),
        }),
    };
    let signals = width_of(CODES_ARRAY)?;
    if width_of(VALUES_ARRAY)? != signals {
        return Err(StorageError::Incompatible {
            path: path.to_path_buf(),
            reason: "codes and values have different widths".to_string(),
        });
    }
    let has_timestamps = schema.field_with_name(TIMESTAMPS_ARRAY).is_ok();

    let mut raw = RawPartition {
        schema: schema_header,
        missing_attribute,
        signals,
        codes: Vec::new(),
        values: Vec::new(),
        timestamps: has_timestamps.then(Vec::new),
    };

    for batch in reader {
        let batch = match batch {
            Ok(batch) => batch,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Partition ends in an incomplete batch, reading rows before it"
                );
                break;
            }
        };
        raw.codes
            .extend(list_values::<UInt16Type>(&batch, CODES_ARRAY, path)?);
        raw.values
            .extend(list_values::<Float32Type>(&batch, VALUES_ARRAY, path)?);
        if let Some(timestamps) = raw.timestamps.as_mut() {
            let column = batch
                .column_by_name(TIMESTAMPS_ARRAY)
                .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
                .ok_or_else(|| column_type_error(path, TIMESTAMPS_ARRAY))?;
            timestamps.extend_from_slice(column.values());
        }
    }

    Ok(raw)
}

fn list_values<T: ArrowPrimitiveType>(
    batch: &RecordBatch,
    name: &str,
    path: &Path,
) -> Result<Vec<T::Native>> {
    let list = batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
        .ok_or_else(|| column_type_error(path, name))?;
    let mut out = Vec::with_capacity(list.len() * list.value_length() as usize);
    for i in 0..list.len() {
        let row = list.value(i);
        let row = row
            .as_any()
            .downcast_ref::<PrimitiveArray<T>>()
            .ok_or_else(|| column_type_error(path, name))?;
        out.extend_from_slice(row.values());
    }
    Ok(out)
}

fn column_type_error(path: &Path, name: &str) -> StorageError {
    StorageError::Incompatible {
        path: path.to_path_buf(),
        reason: format!("'{name}' has an unexpected type"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(seed: u16, signals: usize) -> (Vec<u16>, Vec<f32>) {
        let codes = (0..signals as u16).map(|i| seed.wrapping_add(i)).collect();
        let values = (0..signals).map(|i| f32::from(seed) + i as f32 * 0.5).collect();
        (codes, values)
    }

    #[test]
    fn rows_survive_close_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hour_00.arrows");
        let header = PartitionSchema::new(1, 6, 1000);

        let mut container = ArrowContainer::create(&path, &header).unwrap();
        let (c0, v0) = row(1, 6);
        let (c1, v1) = row(100, 6);
        container.append(&c0, &v0, 11).unwrap();
        container.append(&c1, &v1, 22).unwrap();
        container.close().unwrap();

        let raw = read(&path).unwrap();
        assert_eq!(raw.schema, Some(header));
        assert_eq!(raw.signals, 6);
        assert_eq!(raw.rows(), 2);
        assert_eq!(raw.row(1), (c1.as_slice(), v1.as_slice()));
        assert_eq!(raw.timestamps, Some(vec![11, 22]));
    }

    #[test]
    fn unclosed_stream_is_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hour_00.arrows");
        let header = PartitionSchema::new(1, 4, 1000);

        let mut container = ArrowContainer::create(&path, &header).unwrap();
        let (c, v) = row(7, 4);
        container.append(&c, &v, 5).unwrap();
        drop(container);

        assert_eq!(read(&path).unwrap().rows(), 1);
    }

    #[test]
    fn torn_tail_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hour_00.arrows");
        let header = PartitionSchema::new(1, 4, 1000);

        let mut container = ArrowContainer::create(&path, &header).unwrap();
        for seed in 0..3 {
            let (c, v) = row(seed, 4);
            container.append(&c, &v, i64::from(seed)).unwrap();
        }
        drop(container);

        let len = fs::metadata(&path).unwrap().len();
        OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap()
            .set_len(len - 10)
            .unwrap();

        assert_eq!(read(&path).unwrap().rows(), 2);
    }

    #[test]
    fn resume_keeps_rows_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hour_00.arrows");
        let header = PartitionSchema::new(1, 4, 1000);

        let mut container = ArrowContainer::create(&path, &header).unwrap();
        let (c0, v0) = row(1, 4);
        container.append(&c0, &v0, 1).unwrap();
        container.close().unwrap();

        let mut container = ArrowContainer::resume(&path, &header).unwrap();
        assert_eq!(container.rows(), 1);
        let (c1, v1) = row(2, 4);
        container.append(&c1, &v1, 2).unwrap();
        container.close().unwrap();

        let raw = read(&path).unwrap();
        assert_eq!(raw.rows(), 2);
        assert_eq!(raw.row(0), (c0.as_slice(), v0.as_slice()));
        assert_eq!(raw.timestamps, Some(vec![1, 2]));
        assert!(!staging_path(&path).exists());
    }

    #[test]
    fn resume_rejects_other_width() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hour_00.arrows");

        let mut container = ArrowContainer::create(&path, &PartitionSchema::new(1, 4, 1000)).unwrap();
        container.close().unwrap();

        let err = ArrowContainer::resume(&path, &PartitionSchema::new(1, 36, 1000)).unwrap_err();
        assert!(matches!(err, StorageError::Incompatible { .. }));
        assert_eq!(read(&path).unwrap().signals, 4);
    }

    #[test]
    fn create_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hour_00.arrows");
        fs::write(&path, b"not arrow").unwrap();

        let err = ArrowContainer::create(&path, &PartitionSchema::current()).unwrap_err();
        assert!(matches!(err, StorageError::CreateFailed { .. }));
        assert_eq!(fs::read(&path).unwrap(), b"not arrow");
    }
}
