use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveDate;
use chrono_tz::Tz;

use crate::source::{DateRange, SourceKind};

pub const DEFAULT_API_BASE_URL: &str = "https://golfv2.marianatek.com/api/customer/v1/classes";
pub const DEFAULT_SCHEDULE_URL: &str =
    "https://www.golfv2.com/schedule?_mt=%2Fschedule%2Fdaily%2F48541%3FactiveDate%3D{date}";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
    #[error("A date range is required (GOLF_DATE_FROM / GOLF_DATE_TO or --from / --to)")]
    MissingDateRange,
    #[error("Date range is inverted: {from} is after {to}")]
    InvertedRange { from: NaiveDate, to: NaiveDate },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub source: SourceKind,
    pub api_base_url: String,
    pub region_id: String,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub timezone: Tz,
    pub cache_dir: PathBuf,
    pub output_dir: PathBuf,
    pub page_size: u32,
    pub chunk_days: u32,
    pub slot_capacity: u32,
    pub schedule_url: String,
    pub frame_dir: Option<PathBuf>,
    pub default_location: String,
    pub http_timeout_secs: u64,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var: name,
        reason: e.to_string(),
    })
}

fn parsed_or<T>(name: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    parse_var(name, &var_or(name, default))
}

fn optional<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => parse_var(name, &raw).map(Some),
        _ => Ok(None),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Config {
            source: parsed_or("GOLF_SOURCE", "api")?,
            api_base_url: var_or("GOLF_API_BASE_URL", DEFAULT_API_BASE_URL),
            region_id: var_or("GOLF_REGION_ID", "48541"),
            date_from: optional("GOLF_DATE_FROM")?,
            date_to: optional("GOLF_DATE_TO")?,
            timezone: parsed_or("GOLF_TIMEZONE", "America/New_York")?,
            cache_dir: PathBuf::from(var_or("GOLF_CACHE_DIR", "cache")),
            output_dir: PathBuf::from(var_or("GOLF_OUTPUT_DIR", "output")),
            page_size: parsed_or("GOLF_PAGE_SIZE", "500")?,
            chunk_days: parsed_or("GOLF_CHUNK_DAYS", "31")?,
            slot_capacity: parsed_or("GOLF_SLOT_CAPACITY", "4")?,
            schedule_url: var_or("GOLF_SCHEDULE_URL", DEFAULT_SCHEDULE_URL),
            frame_dir: optional("GOLF_FRAME_DIR")?,
            default_location: var_or("GOLF_DEFAULT_LOCATION", "Tribeca"),
            http_timeout_secs: parsed_or("GOLF_HTTP_TIMEOUT_SECS", "90")?,
        };

        if config.slot_capacity == 0 {
            return Err(ConfigError::Invalid {
                var: "GOLF_SLOT_CAPACITY",
                reason: "must be positive".to_string(),
            });
        }
        Ok(config)
    }

    pub fn date_range(&self) -> Result<DateRange, ConfigError> {
        let (from, to) = self
            .date_from
            .zip(self.date_to)
            .ok_or(ConfigError::MissingDateRange)?;
        DateRange::new(from, to).ok_or(ConfigError::InvertedRange { from, to })
    }
}
