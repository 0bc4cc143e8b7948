//! Append-only record file writer with size-based rotation.

use chrono::Utc;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use super::files::{list_record_files, new_record_path};
use super::models::{MonitorEntry, HEADER};
use super::StoreError;

/// Writer for the active record file of one site.
///
/// Exactly one writer should exist per site directory.
pub struct RecordWriter {
    dir: PathBuf,
    max_file_size: u64,
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl RecordWriter {
    /// Open the site directory and pick the active file.
    ///
    /// Appends to the most recent record file if it is no larger than
    /// `max_file_size`, otherwise starts a new file with a header row.
    pub fn open<P: AsRef<Path>>(dir: P, max_file_size: u64) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let files = list_record_files(&dir)?;
        let latest = match files.last() {
            Some(file) => {
                let size = fs::metadata(&file.path)?.len();
                (size <= max_file_size).then(|| (file.path.clone(), size))
            }
            None => None,
        };

        let (path, writer) = match latest {
            Some((path, size)) => {
                tracing::info!("Appending records to {}", path.display());
                let writer = open_writer(&path, size == 0)?;
                (path, writer)
            }
            None => {
                let path = new_record_path(&dir, Utc::now());
                tracing::info!("Creating new record file {}", path.display());
                let writer = open_writer(&path, true)?;
                (path, writer)
            }
        };

        Ok(Self {
            dir,
            max_file_size,
            path,
            writer,
        })
    }

    /// Path of the file currently being appended to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry, flush it, and rotate if the file grew too large.
    pub fn append(&mut self, entry: &MonitorEntry) -> Result<(), StoreError> {
        self.writer.write_record(entry.to_row())?;
        self.writer.flush()?;

        let size = fs::metadata(&self.path)?.len();
        if size > self.max_file_size {
            self.rotate()?;
        }
        Ok(())
    }

    /// Close the current file and start a new one.
    fn rotate(&mut self) -> Result<(), StoreError> {
        self.writer.flush()?;
        let path = new_record_path(&self.dir, Utc::now());
        tracing::info!(
            "Rotating {} -> {}",
            self.path.display(),
            path.display()
        );
        self.writer = open_writer(&path, true)?;
        self.path = path;
        Ok(())
    }

    /// Flush and close the active file.
    pub fn close(mut self) -> Result<(), StoreError> {
        self.writer.flush()?;
        let file = self
            .writer
            .into_inner()
            .map_err(|e| StoreError::Io(e.into_error()))?;
        file.sync_all()?;
        Ok(())
    }
}

fn open_writer(path: &Path, write_header: bool) -> Result<csv::Writer<File>, StoreError> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(file);
    if write_header {
        writer.write_record(HEADER)?;
        writer.flush()?;
    }
    Ok(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::read_record_file;
    use chrono::{Duration, FixedOffset, TimeZone};
    use tempfile::TempDir;

    fn entry(second: i64, code: u16) -> MonitorEntry {
        let base = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 2, 10, 0, 0)
            .unwrap();
        MonitorEntry {
            timestamp: base + Duration::seconds(second),
            url: "https://example.com".to_string(),
            response_code: code,
            response_time_ms: 50,
            details: None,
        }
    }

    #[test]
    fn test_open_creates_file_with_header() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("site");
        let writer = RecordWriter::open(&dir, 1024).unwrap();
        let path = writer.path().to_path_buf();
        writer.close().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content.lines().next().unwrap(),
            "Timestamp,URL,Response Code,Response Time (ms),Response Details"
        );
    }

    #[test]
    fn test_open_appends_to_latest_small_file() {
        let tmp = TempDir::new().unwrap();
        let mut writer = RecordWriter::open(tmp.path(), 4096).unwrap();
        writer.append(&entry(0, 200)).unwrap();
        let first_path = writer.path().to_path_buf();
        writer.close().unwrap();

        let mut writer = RecordWriter::open(tmp.path(), 4096).unwrap();
        assert_eq!(writer.path(), first_path);
        writer.append(&entry(10, 200)).unwrap();
        writer.close().unwrap();

        let content = fs::read_to_string(&first_path).unwrap();
        // One header and two rows, no repeated header
        assert_eq!(content.lines().count(), 3);
        assert_eq!(read_record_file(&first_path).unwrap().len(), 2);
    }

    #[test]
    fn test_open_skips_oversized_latest_file() {
        let tmp = TempDir::new().unwrap();
        let old = tmp.path().join("2020-01-01_00-00-00.csv");
        fs::write(&old, "x".repeat(200)).unwrap();

        let writer = RecordWriter::open(tmp.path(), 100).unwrap();
        assert_ne!(writer.path(), old);
        writer.close().unwrap();
        assert_eq!(fs::read_to_string(&old).unwrap(), "x".repeat(200));
    }

    #[test]
    fn test_open_appends_to_file_at_exact_limit() {
        let tmp = TempDir::new().unwrap();
        let full = tmp.path().join("2020-01-01_00-00-00.csv");
        let header = "Timestamp,URL,Response Code,Response Time (ms),Response Details\n";
        fs::write(&full, header).unwrap();

        let mut writer = RecordWriter::open(tmp.path(), header.len() as u64).unwrap();
        assert_eq!(writer.path(), full);
        writer.append(&entry(0, 200)).unwrap();
        writer.close().unwrap();
        assert_eq!(read_record_file(&full).unwrap().len(), 1);
    }

    #[test]
    fn test_open_picks_highest_counter() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("2020-01-01_00-00-00.csv"), "").unwrap();
        for n in 1..=10 {
            fs::write(tmp.path().join(format!("2020-01-01_00-00-00_{}.csv", n)), "").unwrap();
        }

        let writer = RecordWriter::open(tmp.path(), 1024).unwrap();
        assert_eq!(writer.path(), tmp.path().join("2020-01-01_00-00-00_10.csv"));
        writer.close().unwrap();
    }

    #[test]
    fn test_rotation_leaves_old_file_untouched() {
        let tmp = TempDir::new().unwrap();
        let mut writer = RecordWriter::open(tmp.path(), 200).unwrap();
        let first_path = writer.path().to_path_buf();

        let mut i = 0;
        while writer.path() == first_path {
            writer.append(&entry(i, 200)).unwrap();
            i += 1;
        }
        let rotated_content = fs::read(&first_path).unwrap();
        assert!(rotated_content.len() as u64 > 200);

        writer.append(&entry(i, 200)).unwrap();
        let second_path = writer.path().to_path_buf();
        writer.close().unwrap();

        assert_eq!(fs::read(&first_path).unwrap(), rotated_content);
        assert_eq!(read_record_file(&first_path).unwrap().len() as i64, i);
        assert_eq!(read_record_file(&second_path).unwrap(), vec![entry(i, 200)]);
    }

    #[test]
    fn test_rotation_within_same_second_uses_distinct_files() {
        let tmp = TempDir::new().unwrap();
        // Header alone exceeds the limit, so every append rotates
        let mut writer = RecordWriter::open(tmp.path(), 10).unwrap();
        for i in 0..3 {
            writer.append(&entry(i, 200)).unwrap();
        }
        writer.close().unwrap();

        let files = list_record_files(tmp.path()).unwrap();
        assert_eq!(files.len(), 4);
        let total: usize = files
            .iter()
            .map(|f| read_record_file(&f.path).unwrap().len())
            .sum();
        assert_eq!(total, 3);
    }
}
