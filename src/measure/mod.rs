//! Measurement engine.
//!
//! Scans a site's record files, keeps the entries that fall inside a date
//! window and computes aggregate and per-focus-interval statistics.

mod focus;
mod performance;

pub use focus::*;
pub use performance::*;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;

use crate::probe::site_dir;
use crate::store::{list_record_files, scan_record_file, MonitorEntry};

/// Measurement error types.
#[derive(Error, Debug)]
pub enum MeasureError {
    #[error("cannot read site directory {path}: {source}")]
    SiteDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The result of one measurement run for one site.
#[derive(Debug, Clone, Serialize)]
pub struct ReportData {
    pub generated_at: DateTime<Utc>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub site_name: String,
    pub measurement_duration_ms: u64,
    pub total_files_size: u64,
    pub file_count: usize,
    pub entries: Vec<MonitorEntry>,
    pub aggregate_performance: PerformanceData,
    pub focus_interval_performance: BTreeMap<FocusInterval, PerformanceData>,
}

/// Reads record files from a data directory and aggregates them.
#[derive(Debug, Clone)]
pub struct MeasurementEngine {
    data_dir: PathBuf,
}

impl MeasurementEngine {
    pub fn new<P: Into<PathBuf>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Measure a site over `[start 00:00, end + 1 day 00:00)`.
    ///
    /// Both dates are optional; a missing bound is open. Unreadable files and
    /// rows are logged and skipped. Only an unreadable site directory fails
    /// the measurement.
    pub fn measure(
        &self,
        site: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        focus_intervals: &[FocusInterval],
    ) -> Result<ReportData, MeasureError> {
        let started = Instant::now();
        let dir = site_dir(&self.data_dir, site);
        let files = list_record_files(&dir).map_err(|source| MeasureError::SiteDirectory {
            path: dir.clone(),
            source,
        })?;

        let window = Window::new(start, end);
        let mut total_files_size = 0u64;
        let mut file_count = 0usize;
        let mut entries = Vec::new();
        let mut focus_entries: BTreeMap<FocusInterval, Vec<MonitorEntry>> =
            focus_intervals.iter().map(|fi| (*fi, Vec::new())).collect();

        for file in files.iter().filter(|f| window.may_contain_file(f.created)) {
            let scan = match scan_record_file(&file.path) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", file.path.display(), e);
                    continue;
                }
            };
            total_files_size += scan.bytes;
            file_count += 1;

            for entry in scan.entries {
                if !window.contains(&entry) {
                    continue;
                }
                for (interval, bucket) in focus_entries.iter_mut() {
                    if interval.contains(&entry.timestamp) {
                        bucket.push(entry.clone());
                    }
                }
                entries.push(entry);
            }
        }

        entries.sort_by_key(|e| e.timestamp);
        let aggregate_performance = compute_performance(&entries);
        let focus_interval_performance = focus_entries
            .iter()
            .map(|(interval, bucket)| (*interval, compute_performance(bucket)))
            .collect();

        let generated_at = Utc::now();
        let (start_date, end_date) = resolve_dates(start, end, &entries, generated_at.date_naive(), site);

        tracing::debug!(
            "Measured {}: {} entries from {} files ({} bytes)",
            site,
            entries.len(),
            file_count,
            total_files_size
        );

        Ok(ReportData {
            generated_at,
            start_date,
            end_date,
            site_name: site.to_string(),
            measurement_duration_ms: started.elapsed().as_millis() as u64,
            total_files_size,
            file_count,
            entries,
            aggregate_performance,
            focus_interval_performance,
        })
    }
}

/// Local date-time bounds of a measurement window.
struct Window {
    after: Option<NaiveDateTime>,
    before: Option<NaiveDateTime>,
}

impl Window {
    fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self {
            after: start.map(start_of_day),
            // The end date is inclusive, so the bound is midnight after it
            before: end.and_then(|d| d.succ_opt()).map(start_of_day),
        }
    }

    /// A file created after the window ends cannot hold any of its entries.
    fn may_contain_file(&self, created: NaiveDateTime) -> bool {
        self.before.map_or(true, |before| created <= before)
    }

    fn contains(&self, entry: &MonitorEntry) -> bool {
        let local = entry.timestamp.naive_local();
        self.after.map_or(true, |after| local > after)
            && self.before.map_or(true, |before| local < before)
    }
}

fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

fn resolve_dates(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    entries: &[MonitorEntry],
    today: NaiveDate,
    site: &str,
) -> (NaiveDate, NaiveDate) {
    let first = entries.first().map(|e| e.timestamp.date_naive());
    let last = entries.last().map(|e| e.timestamp.date_naive());
    if (start.is_none() || end.is_none()) && entries.is_empty() {
        tracing::warn!("No entries for {}; using {} for open window bounds", site, today);
    }
    (
        start.or(first).unwrap_or(today),
        end.or(last).unwrap_or(today),
    )
}
