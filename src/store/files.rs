//! Record file naming and directory listing.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Timestamp pattern encoded at the start of every record file name.
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

const FILE_TIMESTAMP_LEN: usize = 19;
const RECORD_EXTENSION: &str = "csv";

/// A record file found in a site directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFile {
    pub path: PathBuf,
    /// Creation time decoded from the file name (UTC).
    pub created: NaiveDateTime,
    /// Collision counter, 0 for a plain timestamp name.
    pub counter: u32,
}

/// Decode the creation time from a record file name.
///
/// Accepts `2024-01-02_10-00-00.csv` as well as the collision form
/// `2024-01-02_10-00-00_1.csv`.
pub fn parse_file_timestamp(file_name: &str) -> Option<NaiveDateTime> {
    parse_file_name(file_name).map(|(created, _)| created)
}

/// Decode the creation time and collision counter from a record file name.
fn parse_file_name(file_name: &str) -> Option<(NaiveDateTime, u32)> {
    let stem = file_name.strip_suffix(".csv")?;
    let ts = stem.get(..FILE_TIMESTAMP_LEN)?;
    let rest = &stem[FILE_TIMESTAMP_LEN..];
    let counter = if rest.is_empty() {
        0
    } else {
        let digits = rest.strip_prefix('_')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()?
    };
    let created = NaiveDateTime::parse_from_str(ts, FILE_TIMESTAMP_FORMAT).ok()?;
    Some((created, counter))
}

/// List the record files in `dir`, oldest first.
///
/// Files created in the same second are ordered by their numeric counter.
///
/// Files that are not `.csv` are ignored silently; `.csv` files whose name
/// does not carry a timestamp are skipped with a warning.
pub fn list_record_files(dir: &Path) -> io::Result<Vec<RecordFile>> {
    let mut files = Vec::new();

    for dir_entry in fs::read_dir(dir)? {
        let dir_entry = dir_entry?;
        if !dir_entry.file_type()?.is_file() {
            continue;
        }

        let path = dir_entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
            continue;
        }

        let name = dir_entry.file_name();
        let name = name.to_string_lossy();
        match parse_file_name(&name) {
            Some((created, counter)) => files.push(RecordFile {
                path,
                created,
                counter,
            }),
            None => tracing::warn!("Ignoring record file with unexpected name: {}", path.display()),
        }
    }

    files.sort_by_key(|f| (f.created, f.counter));
    Ok(files)
}

/// Pick a fresh file name for a record file created at `now`.
///
/// Two rotations within the same second would collide on the plain
/// timestamp, so a `_N` counter is appended until the name is unused.
pub fn new_record_path(dir: &Path, now: DateTime<Utc>) -> PathBuf {
    let ts = now.format(FILE_TIMESTAMP_FORMAT).to_string();
    let candidate = dir.join(format!("{}.{}", ts, RECORD_EXTENSION));
    if !candidate.exists() {
        return candidate;
    }

    let mut counter = 1u32;
    loop {
        let candidate = dir.join(format!("{}_{}.{}", ts, counter, RECORD_EXTENSION));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use tempfile::TempDir;

    #[test]
    fn test_parse_file_timestamp() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(10, 20, 30)
            .unwrap();
        assert_eq!(parse_file_timestamp("2024-01-02_10-20-30.csv"), Some(expected));
        assert_eq!(parse_file_timestamp("2024-01-02_10-20-30_3.csv"), Some(expected));

        assert_eq!(parse_file_timestamp("2024-01-02_10-20-30.txt"), None);
        assert_eq!(parse_file_timestamp("2024-01-02_10-20-30_x.csv"), None);
        assert_eq!(parse_file_timestamp("2024-01-02_10-20-30_.csv"), None);
        assert_eq!(parse_file_timestamp("notes.csv"), None);
    }

    #[test]
    fn test_list_record_files_sorted() {
        let tmp = TempDir::new().unwrap();
        for name in [
            "2024-01-03_00-00-00.csv",
            "2024-01-01_00-00-00.csv",
            "2024-01-01_00-00-00_1.csv",
            "2024-01-02_12-00-00.csv",
            "README.md",
            "garbage.csv",
        ] {
            fs::write(tmp.path().join(name), "").unwrap();
        }
        fs::create_dir(tmp.path().join("2024-01-04_00-00-00.csv")).unwrap();

        let names: Vec<String> = list_record_files(tmp.path())
            .unwrap()
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            names,
            vec![
                "2024-01-01_00-00-00.csv",
                "2024-01-01_00-00-00_1.csv",
                "2024-01-02_12-00-00.csv",
                "2024-01-03_00-00-00.csv",
            ]
        );
    }

    #[test]
    fn test_list_orders_counters_numerically() {
        let tmp = TempDir::new().unwrap();
        let mut names = vec!["2024-01-01_00-00-00.csv".to_string()];
        names.extend((1..=11).map(|n| format!("2024-01-01_00-00-00_{}.csv", n)));
        for name in &names {
            fs::write(tmp.path().join(name), "").unwrap();
        }

        let files = list_record_files(tmp.path()).unwrap();
        let counters: Vec<u32> = files.iter().map(|f| f.counter).collect();
        assert_eq!(counters, (0..=11).collect::<Vec<u32>>());
        assert_eq!(
            files.last().unwrap().path.file_name().unwrap(),
            "2024-01-01_00-00-00_11.csv"
        );
    }

    #[test]
    fn test_new_record_path_same_second() {
        let tmp = TempDir::new().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();

        let first = new_record_path(tmp.path(), now);
        assert_eq!(first.file_name().unwrap(), "2024-05-06_07-08-09.csv");
        fs::write(&first, "").unwrap();

        let second = new_record_path(tmp.path(), now);
        assert_eq!(second.file_name().unwrap(), "2024-05-06_07-08-09_1.csv");
        fs::write(&second, "").unwrap();

        let third = new_record_path(tmp.path(), now);
        assert_eq!(third.file_name().unwrap(), "2024-05-06_07-08-09_2.csv");
    }
}
