use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::DomainError;

/// A calendar day, `YYYY-MM-DD`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateKey(NaiveDate);

impl DateKey {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.len() != 10 {
            return Err(DomainError::validation("dateKey", format!("`{raw}` is not YYYY-MM-DD")));
        }
        NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .map(Self)
            .map_err(|_| DomainError::validation("dateKey", format!("`{raw}` is not a calendar date")))
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    pub fn month(&self) -> MonthKey {
        MonthKey { year: self.0.year(), month: self.0.month() }
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for DateKey {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

/// A calendar month, `YYYY-MM`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Result<Self, DomainError> {
        if !(1..=12).contains(&month) || !(1970..=9999).contains(&year) {
            return Err(DomainError::validation("monthKey", format!("{year}-{month} is out of range")));
        }
        Ok(Self { year, month })
    }

    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let invalid = || DomainError::validation("monthKey", format!("`{raw}` is not YYYY-MM"));
        let trimmed = raw.trim();
        let (year, month) = trimmed.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, month)
    }

    pub fn containing(instant: DateTime<Utc>) -> Self {
        Self { year: instant.year(), month: instant.month() }
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self { year: self.year + 1, month: 1 }
        } else {
            Self { year: self.year, month: self.month + 1 }
        }
    }

    pub fn last_day(&self) -> NaiveDate {
        self.next().first_day().pred_opt().unwrap_or(NaiveDate::MAX)
    }

    pub fn contains(&self, date_key: &DateKey) -> bool {
        date_key.month() == *self
    }

    /// Half-open UTC instant window `[start, end)` covering the month.
    pub fn window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (midnight(self.first_day()), midnight(self.next().first_day()))
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

string_serde!(DateKey);
string_serde!(MonthKey);

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::{DateKey, MonthKey};

    #[test]
    fn date_keys_must_be_real_calendar_dates() {
        assert_eq!(DateKey::parse("2024-01-15").expect("valid").to_string(), "2024-01-15");
        assert!(DateKey::parse("2024-02-30").is_err());
        assert!(DateKey::parse("2024-1-5").is_err());
        assert!(DateKey::parse("yesterday").is_err());
    }

    #[test]
    fn month_keys_parse_strictly() {
        let month = MonthKey::parse("2024-02").expect("valid");
        assert_eq!(month.to_string(), "2024-02");
        assert_eq!(month.last_day(), NaiveDate::from_ymd_opt(2024, 2, 29).expect("leap day"));

        for bad in ["2024-13", "2024-2", "24-02", "2024/02", ""] {
            assert!(MonthKey::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn december_window_rolls_into_next_year() {
        let (start, end) = MonthKey::parse("2023-12").expect("valid").window();
        assert_eq!(start, Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).single().expect("ts"));
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().expect("ts"));
    }

    #[test]
    fn date_key_belongs_to_its_month() {
        let date = DateKey::parse("2024-01-31").expect("valid");
        assert!(MonthKey::parse("2024-01").expect("valid").contains(&date));
        assert!(!MonthKey::parse("2024-02").expect("valid").contains(&date));
    }
}
