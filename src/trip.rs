//! Trip data model: raw rows as loaded, canonical records as cleaned.

use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::schema;

/// A calendar quarter. Orders chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearQuarter {
    pub year: i32,
    pub quarter: u8,
}

impl YearQuarter {
    /// Returns `None` unless `quarter` is 1-4.
    pub fn new(year: i32, quarter: u8) -> Option<Self> {
        (1..=4).contains(&quarter).then_some(Self { year, quarter })
    }

    pub fn previous(self) -> Self {
        if self.quarter == 1 {
            Self {
                year: self.year - 1,
                quarter: 4,
            }
        } else {
            Self {
                year: self.year,
                quarter: self.quarter - 1,
            }
        }
    }

    /// Same quarter one year earlier.
    pub fn year_earlier(self) -> Self {
        Self {
            year: self.year - 1,
            quarter: self.quarter,
        }
    }

    /// Months (1-12) covered by this quarter.
    pub fn months(self) -> std::ops::RangeInclusive<u32> {
        let first = (u32::from(self.quarter) - 1) * 3 + 1;
        first..=first + 2
    }
}

impl fmt::Display for YearQuarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-Q{}", self.year, self.quarter)
    }
}

/// A discovered trip file named `<prefix>-YYYY-qQ.csv`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct SourceFile {
    pub period: YearQuarter,
    pub prefix: String,
    pub name: String,
    pub path: PathBuf,
}

impl SourceFile {
    /// Parses the file name; `None` when it does not follow the pattern.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let extension = path.extension()?.to_str()?;
        if !extension.eq_ignore_ascii_case(schema::FILE_EXTENSION) {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;

        let (rest, quarter_part) = stem.rsplit_once('-')?;
        let quarter_digits = quarter_part
            .strip_prefix('q')
            .or_else(|| quarter_part.strip_prefix('Q'))?;
        let quarter: u8 = quarter_digits.parse().ok()?;

        let (prefix, year_part) = rest.rsplit_once('-')?;
        if prefix.is_empty() || year_part.len() != 4 || !year_part.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        let year: i32 = year_part.parse().ok()?;

        Some(Self {
            period: YearQuarter::new(year, quarter)?,
            prefix: prefix.to_string(),
            name: name.to_string(),
            path: path.to_path_buf(),
        })
    }
}

/// One CSV row as read, before any coercion. `source` indexes the load manifest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTrip {
    pub source: usize,
    pub trip_id: String,
    pub start_time: String,
    pub end_time: String,
    pub duration: String,
    pub start_station: String,
    pub end_station: String,
    pub bike_id: String,
    pub passholder_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DayType {
    Weekday,
    Weekend,
}

impl DayType {
    pub fn from_weekday(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Sat | Weekday::Sun => DayType::Weekend,
            _ => DayType::Weekday,
        }
    }
}

impl fmt::Display for DayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DayType::Weekday => f.write_str("Weekday"),
            DayType::Weekend => f.write_str("Weekend"),
        }
    }
}

impl std::str::FromStr for DayType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "weekday" => Ok(DayType::Weekday),
            "weekend" => Ok(DayType::Weekend),
            other => Err(format!("unknown day type: {other}")),
        }
    }
}

/// Calendar fields derived from a trip's start timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TemporalFields {
    pub year: i32,
    pub quarter: u8,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub weekday: Weekday,
    pub day_type: DayType,
}

impl TemporalFields {
    pub fn from_timestamp(ts: NaiveDateTime) -> Self {
        let weekday = ts.weekday();
        Self {
            year: ts.year(),
            quarter: schema::quarter_of_month(ts.month()),
            month: ts.month(),
            day: ts.day(),
            hour: ts.hour(),
            weekday,
            day_type: DayType::from_weekday(weekday),
        }
    }

    pub fn year_quarter(&self) -> YearQuarter {
        YearQuarter {
            year: self.year,
            quarter: self.quarter,
        }
    }

    /// 0 = Monday, 6 = Sunday.
    pub fn day_of_week(&self) -> u32 {
        self.weekday.num_days_from_monday()
    }

    pub fn is_weekend(&self) -> bool {
        self.day_type == DayType::Weekend
    }
}

/// A cleaned trip. Immutable once built; the calendar fields are derived from
/// `start_time` on construction and cannot drift from it.
#[derive(Debug, Clone, PartialEq)]
pub struct TripRecord {
    trip_id: String,
    start_time: NaiveDateTime,
    end_time: NaiveDateTime,
    duration_minutes: f64,
    start_station: Option<String>,
    end_station: Option<String>,
    bike_id: Option<String>,
    passholder_type: Option<String>,
    source_file: Option<Arc<str>>,
    temporal: TemporalFields,
}

impl TripRecord {
    pub fn new(
        trip_id: impl Into<String>,
        start_time: NaiveDateTime,
        end_time: NaiveDateTime,
        duration_minutes: f64,
    ) -> Self {
        Self {
            trip_id: trip_id.into(),
            start_time,
            end_time,
            duration_minutes,
            start_station: None,
            end_station: None,
            bike_id: None,
            passholder_type: None,
            source_file: None,
            temporal: TemporalFields::from_timestamp(start_time),
        }
    }

    pub fn with_stations(mut self, start: Option<String>, end: Option<String>) -> Self {
        self.start_station = start;
        self.end_station = end;
        self
    }

    pub fn with_bike(mut self, bike_id: Option<String>) -> Self {
        self.bike_id = bike_id;
        self
    }

    pub fn with_passholder_type(mut self, passholder_type: Option<String>) -> Self {
        self.passholder_type = passholder_type;
        self
    }

    pub fn with_source(mut self, source_file: Arc<str>) -> Self {
        self.source_file = Some(source_file);
        self
    }

    pub fn trip_id(&self) -> &str {
        &self.trip_id
    }

    pub fn start_time(&self) -> NaiveDateTime {
        self.start_time
    }

    pub fn end_time(&self) -> NaiveDateTime {
        self.end_time
    }

    pub fn duration_minutes(&self) -> f64 {
        self.duration_minutes
    }

    pub fn start_station(&self) -> Option<&str> {
        self.start_station.as_deref()
    }

    pub fn end_station(&self) -> Option<&str> {
        self.end_station.as_deref()
    }

    pub fn bike_id(&self) -> Option<&str> {
        self.bike_id.as_deref()
    }

    pub fn passholder_type(&self) -> Option<&str> {
        self.passholder_type.as_deref()
    }

    pub fn source_file(&self) -> Option<&str> {
        self.source_file.as_deref()
    }

    pub fn temporal(&self) -> &TemporalFields {
        &self.temporal
    }

    pub fn year_quarter(&self) -> YearQuarter {
        self.temporal.year_quarter()
    }
}
