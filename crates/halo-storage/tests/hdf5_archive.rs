//! HDF5 partitions, including archives written before per-row timestamps.
#![cfg(feature = "storage_hdf5")]

use chrono::{Duration, TimeZone, Utc};
use halo_core::ResponseType;
use halo_storage::{
    schema::{CHANNEL_COUNT_ATTR, CODES_ARRAY, SAMPLE_RATE_ATTR, STREAM_COUNT_ATTR, VALUES_ARRAY},
    PartitionReader, PartitionSchema, PartitionWriter, RowLayout, TimestampSource,
};

#[test]
fn writer_and_reader_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("2024-06-01").join("hour_09.h5");

    let writer = PartitionWriter::open(&path, PartitionSchema::current()).unwrap();
    let mut values = vec![0f32; 36];
    values[4] = 300.0;
    values[34] = 0.5;
    values[35] = 0.1;
    let at = Utc.with_ymd_and_hms(2024, 6, 1, 9, 15, 0).unwrap();
    writer.append_frame_at(&[0; 36], &values, at).unwrap();
    writer.close().unwrap();

    let reader = PartitionReader::open(&path).unwrap();
    assert_eq!(reader.read_header().unwrap(), PartitionSchema::current());
    let rows = reader.read_all_rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].timestamp, at);
    assert_eq!(rows[0].channel_of_interest, 4);
    assert_eq!(rows[0].response_type, ResponseType::ThresholdExceeded);
}

#[test]
fn untimed_archive_is_readable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hour_02.h5");

    {
        let file = hdf5::File::create(&path).unwrap();
        let codes = file
            .new_dataset::<u16>()
            .shape((2, 32))
            .create(CODES_ARRAY)
            .unwrap();
        let values = file
            .new_dataset::<f32>()
            .shape((2, 32))
            .create(VALUES_ARRAY)
            .unwrap();
        codes.write_raw(&vec![0u16; 64]).unwrap();
        let mut data = vec![0f32; 64];
        data[30] = 0.9;
        data[31] = 0.9;
        values.write_raw(&data).unwrap();
        for ds in [&codes, &values] {
            for (name, value) in [(STREAM_COUNT_ATTR, 1u32), (CHANNEL_COUNT_ATTR, 32), (SAMPLE_RATE_ATTR, 1000)] {
                ds.new_attr::<u32>().create(name).unwrap().write_scalar(&value).unwrap();
            }
        }
    }

    let opened_at = Utc.with_ymd_and_hms(2024, 6, 1, 3, 0, 0).unwrap();
    let reader = PartitionReader::open_at(&path, opened_at).unwrap();
    assert_eq!(reader.layout(), RowLayout::Legacy);
    assert_eq!(reader.read_header().unwrap(), PartitionSchema::new(1, 32, 1000));

    let rows = reader.read_all_rows();
    assert_eq!(rows[0].response_type, ResponseType::SeizureDetected);
    assert_eq!(rows[1].response_type, ResponseType::NormalActivity);
    assert_eq!(rows[1].timestamp, opened_at - Duration::seconds(1));
    assert_eq!(rows[1].timestamp_source, TimestampSource::Approximated);

    // Resuming needs the timestamp dataset
    assert!(PartitionWriter::open(&path, PartitionSchema::new(1, 32, 1000)).is_err());
}
