//! Classify processor responses and persist them to the hourly store.

use chrono::{DateTime, Local, TimeZone, Utc};
use tracing::{debug, warn};

use halo_classifier::ResponseClassifier;
use halo_core::{ClassificationRecord, HaloConfig};
use halo_storage::{FrameLayout, HourlyPartitions, PartitionKey};

use crate::error::Result;

/// Owns the classifier and every open partition of a run.
///
/// Not shared between threads: all rows of a process go through one logger.
#[derive(Debug)]
pub struct ResponseLogger {
    classifier: ResponseClassifier,
    partitions: HourlyPartitions,
    layout: FrameLayout,
    rows_logged: u64,
    failed_rows: u64,
}

impl ResponseLogger {
    /// Logger writing through `partitions`.
    pub fn new(classifier: ResponseClassifier, partitions: HourlyPartitions) -> Self {
        let layout = partitions.frame_layout();
        Self {
            classifier,
            partitions,
            layout,
            rows_logged: 0,
            failed_rows: 0,
        }
    }

    /// Logger for the configured classifier and store.
    pub fn from_config(config: &HaloConfig) -> Result<Self> {
        let classifier = ResponseClassifier::with_config(
            config.classifier.pipeline()?,
            config.classifier.thresholds(),
        );
        Ok(Self::new(classifier, HourlyPartitions::from_config(&config.storage)))
    }

    /// The classifier, for inspection.
    pub fn classifier(&self) -> &ResponseClassifier {
        &self.classifier
    }

    /// The classifier, to change topology or thresholds between responses.
    pub fn classifier_mut(&mut self) -> &mut ResponseClassifier {
        &mut self.classifier
    }

    /// The open partitions.
    pub fn partitions(&self) -> &HourlyPartitions {
        &self.partitions
    }

    /// Rows persisted so far.
    pub fn rows_logged(&self) -> u64 {
        self.rows_logged
    }

    /// Rows that were classified but could not be persisted.
    pub fn failed_rows(&self) -> u64 {
        self.failed_rows
    }

    /// Classify `response` and persist it with the `waveform` that produced
    /// it, in the current local hour.
    pub fn analyze(&mut self, waveform: &[u8], response: &[u8]) -> Result<(ClassificationRecord, PartitionKey)> {
        self.analyze_at(waveform, response, &Local::now())
    }

    /// As [`analyze`](Self::analyze), at an explicit time.
    ///
    /// The record is returned even for an empty or unrecognised response;
    /// only a store failure is an error, and then no row is written.
    pub fn analyze_at<Tz: TimeZone>(
        &mut self,
        waveform: &[u8],
        response: &[u8],
        at: &DateTime<Tz>,
    ) -> Result<(ClassificationRecord, PartitionKey)> {
        let record = self.classifier.decode_at(response, at.with_timezone(&Utc));
        let frame = self.layout.pack(waveform, &record);

        match self.partitions.append_at(&frame, at) {
            Ok(key) => {
                self.rows_logged += 1;
                debug!(
                    partition = %key,
                    response_type = %record.response_type,
                    confidence = record.confidence,
                    "Logged response"
                );
                Ok((record, key))
            }
            Err(e) => {
                self.failed_rows += 1;
                warn!(error = %e, response_type = %record.response_type, "Dropped response row");
                Err(e.into())
            }
        }
    }

    /// Close every open partition.
    pub fn close(self) -> Result<()> {
        self.partitions.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use halo_core::config::PartitionFormat;
    use halo_core::ResponseType;
    use halo_storage::{PartitionReader, PartitionSchema};
    use tracing_test::traced_test;

    fn logger(root: &std::path::Path) -> ResponseLogger {
        ResponseLogger::new(
            ResponseClassifier::new(),
            HourlyPartitions::new(root, PartitionSchema::current(), PartitionFormat::Arrow, 16),
        )
    }

    fn at(day: u32, hour: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 7, day, hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_pattern_response_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = logger(dir.path());
        let response: Vec<u8> = (0..=255).collect();

        let (record, key) = logger.analyze_at(&[130; 32], &response, &at(1, 4)).unwrap();
        assert_eq!(record.response_type, ResponseType::TestPattern);
        assert_eq!(logger.rows_logged(), 1);

        let path = logger.partitions().path_for(key);
        logger.close().unwrap();

        let rows = PartitionReader::open(path).unwrap().read_all_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].stored_type, Some(ResponseType::TestPattern));
        assert_eq!(rows[0].raw_byte, 0);
    }

    #[test]
    fn empty_response_still_logs_a_row() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = logger(dir.path());

        let (record, _) = logger.analyze_at(&[], &[], &at(1, 4)).unwrap();
        assert_eq!(record.response_type, ResponseType::ProcessingError);
        assert_eq!(record.confidence, 0.0);
        assert_eq!(logger.rows_logged(), 1);
    }

    #[traced_test]
    #[test]
    fn store_failure_drops_the_row() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = logger(dir.path());

        logger.analyze_at(&[], &[1], &at(2, 0)).unwrap();
        assert!(logger.analyze_at(&[], &[1], &at(1, 23)).is_err());
        assert_eq!(logger.rows_logged(), 1);
        assert_eq!(logger.failed_rows(), 1);
        assert!(logs_contain("Dropped response row"));
    }
}
