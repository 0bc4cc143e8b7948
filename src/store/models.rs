//! Record store model types.

use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat};
use csv::StringRecord;
use serde::Serialize;
use thiserror::Error;

/// Column names written as the first row of every record file.
pub const HEADER: [&str; 5] = [
    "Timestamp",
    "URL",
    "Response Code",
    "Response Time (ms)",
    "Response Details",
];

/// Errors raised while turning a stored row back into an entry.
#[derive(Error, Debug)]
pub enum EntryParseError {
    #[error("could not parse \"{0}\" as an offset timestamp")]
    Timestamp(String),
    #[error("could not parse \"{value}\" as {column}")]
    Number { column: &'static str, value: String },
    #[error("missing column: {0}")]
    MissingColumn(&'static str),
}

/// A single probe result for one site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorEntry {
    pub timestamp: DateTime<FixedOffset>,
    pub url: String,
    pub response_code: u16,
    pub response_time_ms: u64,
    pub details: Option<String>,
}

impl MonitorEntry {
    /// Any response below 400 counts as OK.
    pub fn is_ok(&self) -> bool {
        self.response_code < 400
    }

    /// Render the entry as the five columns of a record file row.
    pub fn to_row(&self) -> [String; 5] {
        [
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.url.clone(),
            self.response_code.to_string(),
            self.response_time_ms.to_string(),
            self.details.clone().unwrap_or_default(),
        ]
    }

    /// Parse a stored row. Rows without a details column are accepted.
    pub fn from_record(record: &StringRecord) -> Result<Self, EntryParseError> {
        let timestamp_str = record
            .get(0)
            .ok_or(EntryParseError::MissingColumn("Timestamp"))?;
        let timestamp = parse_timestamp(timestamp_str)
            .ok_or_else(|| EntryParseError::Timestamp(timestamp_str.to_string()))?;

        let url = record
            .get(1)
            .ok_or(EntryParseError::MissingColumn("URL"))?
            .to_string();

        let code_str = record
            .get(2)
            .ok_or(EntryParseError::MissingColumn("Response Code"))?;
        let response_code = code_str.trim().parse().map_err(|_| EntryParseError::Number {
            column: "a response code",
            value: code_str.to_string(),
        })?;

        let time_str = record
            .get(3)
            .ok_or(EntryParseError::MissingColumn("Response Time (ms)"))?;
        let response_time_ms = time_str.trim().parse().map_err(|_| EntryParseError::Number {
            column: "a response time",
            value: time_str.to_string(),
        })?;

        let details = record
            .get(4)
            .filter(|d| !d.is_empty())
            .map(str::to_string);

        Ok(Self {
            timestamp,
            url,
            response_code,
            response_time_ms,
            details,
        })
    }
}

/// Parse a stored ISO-8601 timestamp with offset.
///
/// Older files may omit seconds when they are zero (`2024-01-02T10:00Z`).
pub fn parse_timestamp(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }

    let formats = ["%Y-%m-%dT%H:%M%:z", "%Y-%m-%dT%H:%M:%S%.f%:z"];
    for fmt in &formats {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }

    // Trailing "Z" is not accepted by %:z
    if let Some(naive) = s.strip_suffix('Z') {
        for fmt in ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S%.f"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(naive, fmt) {
                return Some(dt.and_utc().fixed_offset());
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn record(fields: &[&str]) -> StringRecord {
        StringRecord::from(fields.to_vec())
    }

    #[test]
    fn test_is_ok_threshold() {
        let mut entry = MonitorEntry {
            timestamp: FixedOffset::east_opt(0).unwrap().with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            url: "https://example.com".to_string(),
            response_code: 399,
            response_time_ms: 10,
            details: None,
        };
        assert!(entry.is_ok());
        entry.response_code = 400;
        assert!(!entry.is_ok());
        entry.response_code = 503;
        assert!(!entry.is_ok());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let full = parse_timestamp("2024-01-02T10:00:00.123Z").unwrap();
        assert_eq!(full.timestamp_subsec_millis(), 123);

        let offset = parse_timestamp("2024-01-02T10:00:00+02:00").unwrap();
        assert_eq!(offset.offset().local_minus_utc(), 7200);

        let no_seconds = parse_timestamp("2024-01-02T10:00Z").unwrap();
        assert_eq!(no_seconds.hour(), 10);
        assert_eq!(no_seconds.second(), 0);

        let no_seconds_offset = parse_timestamp("2024-01-02T10:00+01:00").unwrap();
        assert_eq!(no_seconds_offset.offset().local_minus_utc(), 3600);

        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_from_record() {
        let entry = MonitorEntry::from_record(&record(&[
            "2024-01-02T10:00:00.000Z",
            "https://example.com/health",
            "200",
            "42",
            r#"{"status":"up"}"#,
        ]))
        .unwrap();
        assert_eq!(entry.response_code, 200);
        assert_eq!(entry.response_time_ms, 42);
        assert_eq!(entry.details.as_deref(), Some(r#"{"status":"up"}"#));

        let no_details = MonitorEntry::from_record(&record(&[
            "2024-01-02T10:00:00.000Z",
            "https://example.com",
            "500",
            "7",
            "",
        ]))
        .unwrap();
        assert_eq!(no_details.details, None);

        let four_columns = MonitorEntry::from_record(&record(&[
            "2024-01-02T10:00:00.000Z",
            "https://example.com",
            "301",
            "7",
        ]))
        .unwrap();
        assert_eq!(four_columns.details, None);
    }

    #[test]
    fn test_from_record_errors() {
        let bad_time = MonitorEntry::from_record(&record(&["not-a-time", "u", "200", "1", ""]));
        assert!(matches!(bad_time, Err(EntryParseError::Timestamp(_))));

        let bad_code = MonitorEntry::from_record(&record(&[
            "2024-01-02T10:00:00Z",
            "u",
            "OK",
            "1",
            "",
        ]));
        assert!(matches!(bad_code, Err(EntryParseError::Number { .. })));

        let bad_time_ms = MonitorEntry::from_record(&record(&[
            "2024-01-02T10:00:00Z",
            "u",
            "200",
            "-5",
            "",
        ]));
        assert!(matches!(bad_time_ms, Err(EntryParseError::Number { .. })));

        let short = MonitorEntry::from_record(&record(&["2024-01-02T10:00:00Z", "u"]));
        assert!(matches!(short, Err(EntryParseError::MissingColumn(_))));
    }
}
