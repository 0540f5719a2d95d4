//! Archive catalog: which partitions exist under a root.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::debug;

use halo_core::config::PartitionFormat;

use crate::container::format_of;
use crate::error::Result;
use crate::partitions::PartitionKey;

/// One partition file found in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionEntry {
    /// Date and hour covered
    pub key: PartitionKey,
    /// Container format
    pub format: PartitionFormat,
    /// Full path
    pub path: PathBuf,
}

/// List every partition under `root`, oldest first.
///
/// Only `<YYYY-MM-DD>/hour_HH.<ext>` files with a known extension are
/// reported. A missing root is an empty archive.
pub fn scan_archive(root: impl AsRef<Path>) -> Result<Vec<PartitionEntry>> {
    let root = root.as_ref();
    let days = match fs::read_dir(root) {
        Ok(days) => days,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut entries = Vec::new();
    for day in days {
        let day = day?;
        if !day.file_type()?.is_dir() {
            continue;
        }
        let Some(date) = day
            .file_name()
            .to_str()
            .and_then(|name| NaiveDate::parse_from_str(name, "%Y-%m-%d").ok())
        else {
            continue;
        };

        for file in fs::read_dir(day.path())? {
            let path = file?.path();
            let Some(format) = format_of(&path) else {
                continue;
            };
            let Some(key) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(parse_hour)
                .and_then(|hour| PartitionKey::new(date, hour))
            else {
                continue;
            };
            entries.push(PartitionEntry { key, format, path });
        }
    }

    entries.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.path.cmp(&b.path)));
    debug!(root = %root.display(), partitions = entries.len(), "Scanned archive");
    Ok(entries)
}

fn parse_hour(stem: &str) -> Option<u32> {
    let digits = stem.strip_prefix("hour_")?;
    if digits.len() != 2 {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn lists_partitions_chronologically() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "2024-01-02/hour_00.arrows");
        touch(root, "2024-01-01/hour_23.h5");
        touch(root, "2024-01-01/hour_05.arrows");
        touch(root, "2024-01-01/hour_05.arrows.tmp");
        touch(root, "2024-01-01/hour_5.arrows");
        touch(root, "2024-01-01/hour_24.arrows");
        touch(root, "2024-01-01/notes.txt");
        touch(root, "scratch/hour_01.arrows");
        touch(root, "2024-01-03");

        let entries = scan_archive(root).unwrap();
        let keys: Vec<String> = entries.iter().map(|e| e.key.to_string()).collect();
        assert_eq!(
            keys,
            ["2024-01-01 hour 05", "2024-01-01 hour 23", "2024-01-02 hour 00"]
        );
        assert_eq!(entries[1].format, PartitionFormat::Hdf5);
    }

    #[test]
    fn missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_archive(dir.path().join("absent")).unwrap().is_empty());
    }

    #[test]
    fn hour_names_need_two_digits() {
        assert_eq!(parse_hour("hour_07"), Some(7));
        assert_eq!(parse_hour("hour_7"), None);
        assert_eq!(parse_hour("hours_07"), None);
    }
}
