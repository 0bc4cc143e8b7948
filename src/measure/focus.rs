//! Daily focus intervals.

use chrono::{DateTime, FixedOffset, NaiveTime, Timelike};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid focus interval \"{0}\", expected HH:MM-HH:MM with start not after end")]
pub struct FocusIntervalError(pub String);

/// An inclusive time-of-day range, repeated every day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FocusInterval {
    pub from: NaiveTime,
    pub to: NaiveTime,
}

impl FocusInterval {
    pub fn new(from: NaiveTime, to: NaiveTime) -> Result<Self, FocusIntervalError> {
        if from > to {
            return Err(FocusIntervalError(format!("{}-{}", from, to)));
        }
        Ok(Self { from, to })
    }

    /// True if the entry's wall-clock time falls within `[from, to]`.
    pub fn contains(&self, time: &DateTime<FixedOffset>) -> bool {
        let t = time.time();
        self.from <= t && t <= self.to
    }
}

impl FromStr for FocusInterval {
    type Err = FocusIntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FocusIntervalError(s.to_string());
        let (from, to) = s.split_once('-').ok_or_else(invalid)?;
        let from = parse_time_of_day(from).ok_or_else(invalid)?;
        let to = parse_time_of_day(to).ok_or_else(invalid)?;
        Self::new(from, to).map_err(|_| invalid())
    }
}

fn parse_time_of_day(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

impl fmt::Display for FocusInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_time(f, self.from)?;
        f.write_str("-")?;
        write_time(f, self.to)
    }
}

fn write_time(f: &mut fmt::Formatter<'_>, t: NaiveTime) -> fmt::Result {
    if t.second() == 0 {
        write!(f, "{}", t.format("%H:%M"))
    } else {
        write!(f, "{}", t.format("%H:%M:%S"))
    }
}

impl Serialize for FocusInterval {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 2, h, m, s)
            .unwrap()
    }

    #[test]
    fn test_parse_focus_interval() {
        let fi: FocusInterval = "09:00-17:30".parse().unwrap();
        assert_eq!(fi.from, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(fi.to, NaiveTime::from_hms_opt(17, 30, 0).unwrap());
        assert_eq!(fi.to_string(), "09:00-17:30");

        let with_seconds: FocusInterval = " 08:00:15 - 08:30 ".parse().unwrap();
        assert_eq!(with_seconds.to_string(), "08:00:15-08:30");

        assert!("17:00-09:00".parse::<FocusInterval>().is_err());
        assert!("09:00".parse::<FocusInterval>().is_err());
        assert!("9am-5pm".parse::<FocusInterval>().is_err());
        assert!("25:00-26:00".parse::<FocusInterval>().is_err());
    }

    #[test]
    fn test_contains_is_inclusive() {
        let fi: FocusInterval = "09:00-17:00".parse().unwrap();
        assert!(fi.contains(&at(9, 0, 0)));
        assert!(fi.contains(&at(17, 0, 0)));
        assert!(fi.contains(&at(12, 30, 0)));
        assert!(!fi.contains(&at(8, 59, 59)));
        assert!(!fi.contains(&at(17, 0, 1)));
    }

    #[test]
    fn test_contains_uses_entry_local_time() {
        let fi: FocusInterval = "09:00-10:00".parse().unwrap();
        // 08:30 UTC is 09:30 at +01:00
        let utc = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 8, 30, 0).unwrap();
        assert!(!fi.contains(&utc.fixed_offset()));
        assert!(fi.contains(&utc.with_timezone(&FixedOffset::east_opt(3600).unwrap())));
    }

    #[test]
    fn test_new_rejects_reversed() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let five = NaiveTime::from_hms_opt(17, 0, 0).unwrap();
        assert!(FocusInterval::new(nine, five).is_ok());
        assert!(FocusInterval::new(five, nine).is_err());
        assert!(FocusInterval::new(nine, nine).is_ok());
    }

    #[test]
    fn test_serializes_as_string() {
        let fi: FocusInterval = "09:00-17:00".parse().unwrap();
        assert_eq!(serde_json::to_string(&fi).unwrap(), "\"09:00-17:00\"");
    }
}
