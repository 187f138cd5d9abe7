use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};

/// Format used for times written into player records.
pub const STORED_TIME_FORMAT: &str = "%m-%d-%Y %H:%M:%S";

const DATASET_DATE_TIME_FORMATS: [&str; 6] = [
  "%m/%d/%Y %H:%M:%S",
  "%m/%d/%Y %H:%M",
  "%Y-%m-%d %H:%M:%S",
  "%Y-%m-%d %H:%M",
  "%m-%d-%Y %H:%M:%S",
  "%m-%d-%Y %H:%M",
];

const DATASET_DATE_FORMATS: [&str; 3] = ["%m/%d/%Y", "%Y-%m-%d", "%m-%d-%Y"];

/// Shift a UTC instant into the designers' fixed-offset local time.
pub fn local_time(now: DateTime<Utc>, offset_hours: i32) -> NaiveDateTime {
  now.naive_utc() + Duration::hours(i64::from(offset_hours))
}

pub fn format_time(time: NaiveDateTime) -> String {
  time.format(STORED_TIME_FORMAT).to_string()
}

pub fn parse_stored_time(text: &str) -> Option<NaiveDateTime> {
  NaiveDateTime::parse_from_str(text.trim(), STORED_TIME_FORMAT).ok()
}

/// A date cell from a reference dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetTime {
  /// The cell named a time of day.
  At(NaiveDateTime),
  /// The cell named a calendar day only.
  Day(NaiveDate),
}

impl DatasetTime {
  pub fn start(self) -> NaiveDateTime {
    match self {
      DatasetTime::At(time) => time,
      DatasetTime::Day(day) => day.and_time(NaiveTime::MIN),
    }
  }

  /// End of an interval bounded by this cell: the exact time if one was
  /// given, otherwise the end of the named day.
  pub fn end(self) -> NaiveDateTime {
    match self {
      DatasetTime::At(time) => time,
      DatasetTime::Day(_) => self.end_of_day(),
    }
  }

  /// Last second of the calendar day this time falls on.
  pub fn end_of_day(self) -> NaiveDateTime {
    let day = match self {
      DatasetTime::At(time) => time.date(),
      DatasetTime::Day(day) => day,
    };
    day.and_hms_opt(23, 59, 59).unwrap_or_else(|| day.and_time(NaiveTime::MIN))
  }
}

pub fn parse_dataset_time(text: &str) -> Option<DatasetTime> {
  let text = text.trim();
  if text.is_empty() {
    return None;
  }

  DATASET_DATE_TIME_FORMATS
    .iter()
    .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
    .map(DatasetTime::At)
    .or_else(|| {
      DATASET_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .map(DatasetTime::Day)
    })
}

pub fn elapsed_seconds(start: NaiveDateTime, end: NaiveDateTime) -> i64 {
  (end - start).num_seconds()
}
