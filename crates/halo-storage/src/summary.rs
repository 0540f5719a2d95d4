//! Aggregates over decoded rows for review dashboards.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate, TimeZone};

use halo_core::ResponseType;

use crate::reader::DetectionRow;

/// Counts of detections by type, day and month.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionSummary {
    /// Rows seen
    pub total_rows: usize,
    /// Rows per re-derived response type
    pub by_type: HashMap<ResponseType, usize>,
    /// Seizure detections per calendar day
    pub seizures_per_day: BTreeMap<NaiveDate, usize>,
    /// Seizure detections per `(year, month)`
    pub seizures_per_month: BTreeMap<(i32, u32), usize>,
}

impl DetectionSummary {
    /// Summarise `rows`, bucketing days and months in `tz`.
    pub fn from_rows<'a, Tz: TimeZone>(
        rows: impl IntoIterator<Item = &'a DetectionRow>,
        tz: &Tz,
    ) -> Self {
        let mut summary = Self::default();
        for row in rows {
            summary.add(row, tz);
        }
        summary
    }

    /// Count one row.
    pub fn add<Tz: TimeZone>(&mut self, row: &DetectionRow, tz: &Tz) {
        self.total_rows += 1;
        *self.by_type.entry(row.response_type).or_default() += 1;

        if row.response_type == ResponseType::SeizureDetected {
            let date = row.timestamp.with_timezone(tz).date_naive();
            *self.seizures_per_day.entry(date).or_default() += 1;
            *self
                .seizures_per_month
                .entry((date.year(), date.month()))
                .or_default() += 1;
        }
    }

    /// Rows classified as `response_type`.
    pub fn count(&self, response_type: ResponseType) -> usize {
        self.by_type.get(&response_type).copied().unwrap_or(0)
    }

    /// Seizure detections on `date`.
    pub fn seizures_on(&self, date: NaiveDate) -> usize {
        self.seizures_per_day.get(&date).copied().unwrap_or(0)
    }
}

/// The `limit` most recent rows whose channel of interest is `channel`,
/// newest first.
pub fn latest_for_channel(rows: &[DetectionRow], channel: usize, limit: usize) -> Vec<&DetectionRow> {
    let mut matching: Vec<&DetectionRow> = rows
        .iter()
        .filter(|row| row.channel_of_interest == channel)
        .collect();
    matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    matching.truncate(limit);
    matching
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::TimestampSource;
    use chrono::{Duration, Utc};

    fn row(index: usize, hours: i64, response_type: ResponseType, channel: usize) -> DetectionRow {
        DetectionRow {
            row_index: index,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 31, 20, 0, 0).unwrap() + Duration::hours(hours),
            timestamp_source: TimestampSource::Recorded,
            response_type,
            stored_type: Some(response_type),
            raw_byte: 0,
            confidence: 0.0,
            activity_level: 0.0,
            secondary_metric: 0.0,
            channel_of_interest: channel,
            description: String::new(),
        }
    }

    #[test]
    fn counts_by_type_day_and_month() {
        let rows = vec![
            row(0, 0, ResponseType::SeizureDetected, 1),
            row(1, 1, ResponseType::NormalActivity, 1),
            row(2, 5, ResponseType::SeizureDetected, 2),
            row(3, 6, ResponseType::SeizureDetected, 1),
        ];
        let summary = DetectionSummary::from_rows(&rows, &Utc);

        assert_eq!(summary.total_rows, 4);
        assert_eq!(summary.count(ResponseType::SeizureDetected), 3);
        assert_eq!(summary.count(ResponseType::TestPattern), 0);
        assert_eq!(summary.seizures_on(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()), 1);
        assert_eq!(summary.seizures_on(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()), 2);
        assert_eq!(summary.seizures_per_month.get(&(2024, 2)), Some(&2));
    }

    #[test]
    fn latest_for_channel_is_newest_first() {
        let rows = vec![
            row(0, 0, ResponseType::SeizureDetected, 1),
            row(1, 2, ResponseType::NormalActivity, 1),
            row(2, 1, ResponseType::SeizureDetected, 1),
            row(3, 3, ResponseType::SeizureDetected, 4),
        ];
        let latest = latest_for_channel(&rows, 1, 2);
        let indices: Vec<usize> = latest.iter().map(|r| r.row_index).collect();
        assert_eq!(indices, vec![1, 2]);
    }
}
