use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize, Serializer};

/// One normalized slot observation in the facility's local time zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRecord {
    pub location: String,
    pub timestamp: DateTime<Tz>,
    pub capacity: u32,
    pub booked: u32,
}

impl CanonicalRecord {
    pub fn local_date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Slot text scraped from the booking widget for a single target date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedSlot {
    pub date: NaiveDate,
    pub time: String,
    pub location: String,
    pub status: String,
}

/// A class as returned by the customer classes endpoint.
///
/// Every field is optional so that one incomplete class is rejected on its
/// own instead of failing the whole page. Entries with mistyped fields
/// arrive as [`RawRecord::Undecodable`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiClass {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub start_datetime: Option<String>,
    #[serde(default)]
    pub capacity: Option<i64>,
    #[serde(default)]
    pub available_spot_count: Option<i64>,
    #[serde(default)]
    pub location: Option<ApiLocation>,
}

impl ApiClass {
    /// The class ID as text, whether the endpoint sent a string or a number.
    pub fn class_id(&self) -> Option<String> {
        self.id.as_ref().and_then(id_text)
    }
}

pub(crate) fn id_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiLocation {
    pub name: String,
}

/// A classes endpoint entry whose fields did not have the expected types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndecodableClass {
    pub id: Option<String>,
    pub reason: String,
}

/// Raw input from either ingestion source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawRecord {
    Scraped(ScrapedSlot),
    Api(ApiClass),
    Undecodable(UndecodableClass),
}

/// `booked / capacity`, or undefined when nothing was offered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Utilization(Option<f64>);

impl Utilization {
    pub fn from_counts(booked: u64, capacity: u64) -> Self {
        if capacity == 0 {
            Self(None)
        } else {
            Self(Some(booked as f64 / capacity as f64))
        }
    }

    /// Mean of the defined values; undefined when none are defined.
    pub fn mean<I: IntoIterator<Item = Utilization>>(values: I) -> Self {
        let (sum, count) = values
            .into_iter()
            .filter_map(|u| u.0)
            .fold((0.0, 0u32), |(sum, count), v| (sum + v, count + 1));
        if count == 0 {
            Self(None)
        } else {
            Self(Some(sum / f64::from(count)))
        }
    }

    pub fn value(&self) -> Option<f64> {
        self.0
    }

    pub fn is_defined(&self) -> bool {
        self.0.is_some()
    }
}

impl fmt::Display for Utilization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{v}"),
            None => f.write_str("undefined"),
        }
    }
}

impl Serialize for Utilization {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Meteorological season of a local calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Fall,
}

impl Season {
    pub fn from_month(month: u32) -> Self {
        match month {
            12 | 1 | 2 => Season::Winter,
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            _ => Season::Fall,
        }
    }

    pub fn of_date(date: NaiveDate) -> Self {
        Self::from_month(date.month())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Season::Winter => "Winter",
            Season::Spring => "Spring",
            Season::Summer => "Summer",
            Season::Fall => "Fall",
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Day of week ordered Monday first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DayOfWeek(u8);

impl DayOfWeek {
    pub fn of_date(date: NaiveDate) -> Self {
        Self::from(date.weekday())
    }

    pub fn name(&self) -> &'static str {
        match self.0 {
            0 => "Monday",
            1 => "Tuesday",
            2 => "Wednesday",
            3 => "Thursday",
            4 => "Friday",
            5 => "Saturday",
            _ => "Sunday",
        }
    }
}

impl From<Weekday> for DayOfWeek {
    fn from(weekday: Weekday) -> Self {
        Self(weekday.num_days_from_monday() as u8)
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for DayOfWeek {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}
