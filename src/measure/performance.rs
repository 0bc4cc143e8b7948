//! Aggregate statistics over a set of entries.

use serde::{Serialize, Serializer};
use std::time::Duration;

use crate::store::MonitorEntry;

/// Performance statistics computed from a list of entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceData {
    /// Mean response time in milliseconds.
    pub average_response_time: f64,
    pub success_percent: f64,
    #[serde(rename = "total_uptime_ms", serialize_with = "as_millis")]
    pub total_uptime: Duration,
    #[serde(rename = "total_downtime_ms", serialize_with = "as_millis")]
    pub total_downtime: Duration,
    pub uptime_percent: f64,
    pub entry_count: usize,
}

impl Default for PerformanceData {
    fn default() -> Self {
        Self {
            average_response_time: 0.0,
            success_percent: 100.0,
            total_uptime: Duration::ZERO,
            total_downtime: Duration::ZERO,
            uptime_percent: 100.0,
            entry_count: 0,
        }
    }
}

/// Compute performance data for a set of entries.
///
/// Entries are considered in timestamp order. The gap between two
/// consecutive OK entries counts as uptime and the gap between two
/// consecutive failing entries counts as downtime. A gap across a state
/// change counts as neither.
pub fn compute_performance(entries: &[MonitorEntry]) -> PerformanceData {
    if entries.is_empty() {
        return PerformanceData::default();
    }

    let mut sorted: Vec<&MonitorEntry> = entries.iter().collect();
    sorted.sort_by_key(|e| e.timestamp);

    let mut response_time_sum: u64 = 0;
    let mut error_count: usize = 0;
    let mut uptime_ms: i64 = 0;
    let mut downtime_ms: i64 = 0;
    let mut previous: Option<&MonitorEntry> = None;

    for entry in sorted {
        if !entry.is_ok() {
            error_count += 1;
        }
        if let Some(prev) = previous {
            let gap = (entry.timestamp - prev.timestamp).num_milliseconds();
            match (prev.is_ok(), entry.is_ok()) {
                (true, true) => uptime_ms += gap,
                (false, false) => downtime_ms += gap,
                _ => {}
            }
        }
        response_time_sum += entry.response_time_ms;
        previous = Some(entry);
    }

    let total = entries.len() as f64;
    let average_response_time = response_time_sum as f64 / total;
    let success_percent = 100.0 * (entries.len() - error_count) as f64 / total;
    let uptime_percent = if uptime_ms + downtime_ms > 0 {
        100.0 * uptime_ms as f64 / (uptime_ms + downtime_ms) as f64
    } else {
        100.0
    };

    PerformanceData {
        average_response_time,
        success_percent,
        total_uptime: Duration::from_millis(uptime_ms.max(0) as u64),
        total_downtime: Duration::from_millis(downtime_ms.max(0) as u64),
        uptime_percent,
        entry_count: entries.len(),
    }
}

/// Format a duration as `1d 02h 03m 04s`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    format!(
        "{}d {:02}h {:02}m {:02}s",
        secs / 86_400,
        (secs % 86_400) / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}

fn as_millis<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(d.as_millis() as u64)
}
