//! Reading record files that may still be appended to.

use std::fs;
use std::path::Path;

use super::models::MonitorEntry;
use super::StoreError;

/// Result of scanning one record file.
#[derive(Debug, Default)]
pub struct FileScan {
    pub entries: Vec<MonitorEntry>,
    /// Bytes read from disk, including any trailing partial line.
    pub bytes: u64,
    /// Rows that could not be parsed.
    pub skipped_rows: usize,
}

/// Parse every complete data row of a record file.
///
/// Only whole records are parsed, so a row being written concurrently is
/// ignored rather than read half-finished. Malformed rows are logged and
/// skipped.
pub fn scan_record_file(path: &Path) -> Result<FileScan, StoreError> {
    let data = fs::read(path)?;
    let complete = complete_records(&data);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(complete);

    let mut scan = FileScan {
        bytes: data.len() as u64,
        ..Default::default()
    };

    for result in reader.records() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Skipping unreadable row in {}: {}", path.display(), e);
                scan.skipped_rows += 1;
                continue;
            }
        };

        match MonitorEntry::from_record(&record) {
            Ok(entry) => scan.entries.push(entry),
            Err(e) => {
                let line = record.position().map(|p| p.line()).unwrap_or_default();
                tracing::warn!("Skipping row at {}:{}: {}", path.display(), line, e);
                scan.skipped_rows += 1;
            }
        }
    }

    Ok(scan)
}

/// Prefix of `data` up to and including the last newline outside a quoted field.
///
/// Details may hold newlines inside quotes, so a newline alone does not end a
/// record. A doubled quote toggles twice and leaves the state unchanged.
fn complete_records(data: &[u8]) -> &[u8] {
    let mut in_quotes = false;
    let mut end = 0;
    for (i, &b) in data.iter().enumerate() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b'\n' if !in_quotes => end = i + 1,
            _ => {}
        }
    }
    &data[..end]
}

/// Read all parseable entries of a record file.
pub fn read_record_file(path: &Path) -> Result<Vec<MonitorEntry>, StoreError> {
    Ok(scan_record_file(path)?.entries)
}
