use chrono::{DateTime, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::label::LabelInterpreter;
use crate::record::{ApiClass, CanonicalRecord, RawRecord, ScrapedSlot};

/// Clock formats the booking widget uses for slot start times.
const SLOT_TIME_FORMATS: [&str; 2] = ["%I:%M %p", "%I:%M%p"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedRecordError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),
    #[error("Failed to parse time '{value}': {reason}")]
    InvalidTime { value: String, reason: String },
    #[error("Local time {0} does not exist in the facility time zone")]
    NonexistentLocalTime(NaiveDateTime),
    #[error("Capacity must be positive, got {0}")]
    NonPositiveCapacity(i64),
    #[error("Capacity {0} is too large")]
    CapacityTooLarge(i64),
    #[error("Location is empty")]
    EmptyLocation,
    #[error("Class {id} could not be decoded: {reason}")]
    Undecodable { id: String, reason: String },
}

/// Non-fatal conditions noticed while normalizing a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordFlags {
    pub unrecognized_label: bool,
    pub clamped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub record: CanonicalRecord,
    pub flags: RecordFlags,
}

#[derive(Debug, Clone)]
pub struct RecordNormalizer {
    tz: Tz,
    slot_capacity: u32,
    interpreter: LabelInterpreter,
}

impl RecordNormalizer {
    pub fn new(tz: Tz, slot_capacity: u32) -> Self {
        Self {
            tz,
            slot_capacity,
            interpreter: LabelInterpreter::new(slot_capacity),
        }
    }

    pub fn with_interpreter(mut self, interpreter: LabelInterpreter) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn normalize(&self, raw: &RawRecord) -> Result<Normalized, MalformedRecordError> {
        match raw {
            RawRecord::Scraped(slot) => self.normalize_scraped(slot),
            RawRecord::Api(class) => self.normalize_api(class),
            RawRecord::Undecodable(class) => Err(MalformedRecordError::Undecodable {
                id: class.id.clone().unwrap_or_else(|| "without id".to_string()),
                reason: class.reason.clone(),
            }),
        }
    }

    fn normalize_scraped(&self, slot: &ScrapedSlot) -> Result<Normalized, MalformedRecordError> {
        let location = non_empty_location(&slot.location)?;
        let time = parse_slot_time(&slot.time)?;
        let naive = slot.date.and_time(time);

        // Fall-back hours resolve to the first occurrence.
        let timestamp = self
            .tz
            .from_local_datetime(&naive)
            .earliest()
            .ok_or(MalformedRecordError::NonexistentLocalTime(naive))?;

        let capacity = self.slot_capacity;
        if capacity == 0 {
            return Err(MalformedRecordError::NonPositiveCapacity(0));
        }

        let label = self.interpreter.interpret(&slot.status);
        let (booked, clamped) = clamp_booked(i64::from(label.booked), capacity);

        Ok(Normalized {
            record: CanonicalRecord {
                location,
                timestamp,
                capacity,
                booked,
            },
            flags: RecordFlags {
                unrecognized_label: label.is_flagged(),
                clamped,
            },
        })
    }

    fn normalize_api(&self, class: &ApiClass) -> Result<Normalized, MalformedRecordError> {
        let location = class
            .location
            .as_ref()
            .ok_or(MalformedRecordError::MissingField("location"))
            .and_then(|loc| non_empty_location(&loc.name))?;

        let start = class
            .start_datetime
            .as_deref()
            .ok_or(MalformedRecordError::MissingField("start_datetime"))?;
        let timestamp = parse_utc_instant(start)?.with_timezone(&self.tz);

        let raw_capacity = class
            .capacity
            .ok_or(MalformedRecordError::MissingField("capacity"))?;
        if raw_capacity <= 0 {
            return Err(MalformedRecordError::NonPositiveCapacity(raw_capacity));
        }
        let capacity = u32::try_from(raw_capacity)
            .map_err(|_| MalformedRecordError::CapacityTooLarge(raw_capacity))?;

        let available = class
            .available_spot_count
            .ok_or(MalformedRecordError::MissingField("available_spot_count"))?;
        let (booked, clamped) = clamp_booked(raw_capacity.saturating_sub(available), capacity);

        Ok(Normalized {
            record: CanonicalRecord {
                location,
                timestamp,
                capacity,
                booked,
            },
            flags: RecordFlags {
                unrecognized_label: false,
                clamped,
            },
        })
    }
}

fn non_empty_location(name: &str) -> Result<String, MalformedRecordError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        Err(MalformedRecordError::EmptyLocation)
    } else {
        Ok(trimmed.to_string())
    }
}

fn parse_slot_time(value: &str) -> Result<NaiveTime, MalformedRecordError> {
    let trimmed = value.trim();
    let mut last_err = None;
    for format in SLOT_TIME_FORMATS {
        match NaiveTime::parse_from_str(trimmed, format) {
            Ok(time) => return Ok(time),
            Err(e) => last_err = Some(e),
        }
    }
    Err(MalformedRecordError::InvalidTime {
        value: value.to_string(),
        reason: last_err.map(|e| e.to_string()).unwrap_or_default(),
    })
}

/// Accepts RFC 3339 with any offset; a bare timestamp is taken as UTC.
fn parse_utc_instant(value: &str) -> Result<DateTime<Utc>, MalformedRecordError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value.trim()) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value.trim(), "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|e| MalformedRecordError::InvalidTime {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Returns the booked count forced into `[0, capacity]` and whether it moved.
fn clamp_booked(booked: i64, capacity: u32) -> (u32, bool) {
    let clamped = booked.clamp(0, i64::from(capacity));
    if clamped != booked {
        warn!(booked, capacity, "Booked count outside [0, capacity], clamping");
    }
    // In range after the clamp above.
    (clamped as u32, clamped != booked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ApiLocation, UndecodableClass};
    use chrono::{NaiveDate, Timelike};
    use chrono_tz::America::New_York;

    fn scraped(time: &str, status: &str) -> RawRecord {
        RawRecord::Scraped(ScrapedSlot {
            date: NaiveDate::from_ymd_opt(2025, 4, 28).unwrap(),
            time: time.to_string(),
            location: "Tribeca".to_string(),
            status: status.to_string(),
        })
    }

    fn api(start: &str, capacity: Option<i64>, available: Option<i64>) -> RawRecord {
        RawRecord::Api(ApiClass {
            id: None,
            start_datetime: Some(start.to_string()),
            capacity,
            available_spot_count: available,
            location: Some(ApiLocation {
                name: "Tribeca".to_string(),
            }),
        })
    }

    #[test]
    fn test_scraped_slot_uses_label_and_local_date() {
        let normalizer = RecordNormalizer::new(New_York, 4);
        let result = normalizer.normalize(&scraped("7:00 PM", "3/4 Open")).unwrap();

        assert_eq!(result.record.location, "Tribeca");
        assert_eq!(result.record.capacity, 4);
        assert_eq!(result.record.booked, 1);
        assert_eq!(result.record.timestamp.hour(), 19);
        assert_eq!(
            result.record.local_date(),
            NaiveDate::from_ymd_opt(2025, 4, 28).unwrap()
        );
        assert_eq!(result.flags, RecordFlags::default());
    }

    #[test]
    fn test_scraped_slot_accepts_padded_and_unspaced_times() {
        let normalizer = RecordNormalizer::new(New_York, 4);
        let padded = normalizer.normalize(&scraped("09:30 AM", "Waitlist")).unwrap();
        assert_eq!(padded.record.timestamp.hour(), 9);
        assert_eq!(padded.record.booked, 4);

        let unspaced = normalizer.normalize(&scraped("11:00PM", "4/4 Open")).unwrap();
        assert_eq!(unspaced.record.timestamp.hour(), 23);
    }

    #[test]
    fn test_scraped_unrecognized_label_is_flagged_not_rejected() {
        let normalizer = RecordNormalizer::new(New_York, 4);
        let result = normalizer.normalize(&scraped("7:00 PM", "Book now")).unwrap();
        assert_eq!(result.record.booked, 0);
        assert!(result.flags.unrecognized_label);
    }

    #[test]
    fn test_scraped_bad_time_is_rejected() {
        let normalizer = RecordNormalizer::new(New_York, 4);
        let result = normalizer.normalize(&scraped("nineteen hundred", "3/4 Open"));
        assert!(matches!(
            result,
            Err(MalformedRecordError::InvalidTime { .. })
        ));
    }

    #[test]
    fn test_scraped_private_block_clamped_on_small_slot() {
        let normalizer = RecordNormalizer::new(New_York, 1);
        let result = normalizer.normalize(&scraped("7:00 PM", "(1/2 Open)")).unwrap();
        assert_eq!(result.record.booked, 1);
        assert!(result.flags.clamped);
    }

    #[test]
    fn test_scraped_nonexistent_local_time_is_rejected() {
        // 2025-03-09 02:30 is skipped by the spring-forward transition in New York
        let raw = RawRecord::Scraped(ScrapedSlot {
            date: NaiveDate::from_ymd_opt(2025, 3, 9).unwrap(),
            time: "2:30 AM".to_string(),
            location: "Tribeca".to_string(),
            status: "4/4 Open".to_string(),
        });
        let result = RecordNormalizer::new(New_York, 4).normalize(&raw);
        assert!(matches!(
            result,
            Err(MalformedRecordError::NonexistentLocalTime(_))
        ));
    }

    #[test]
    fn test_undecodable_class_is_rejected() {
        let raw = RawRecord::Undecodable(UndecodableClass {
            id: Some("77".to_string()),
            reason: "missing field `name`".to_string(),
        });
        let result = RecordNormalizer::new(New_York, 4).normalize(&raw);
        assert_eq!(
            result,
            Err(MalformedRecordError::Undecodable {
                id: "77".to_string(),
                reason: "missing field `name`".to_string(),
            })
        );
    }

    #[test]
    fn test_api_record_converts_utc_to_local() {
        let normalizer = RecordNormalizer::new(New_York, 4);
        // 02:00 UTC on the 1st is 22:00 EDT on the previous day
        let result = normalizer
            .normalize(&api("2024-06-01T02:00:00Z", Some(4), Some(1)))
            .unwrap();

        assert_eq!(result.record.booked, 3);
        assert_eq!(result.record.capacity, 4);
        assert_eq!(result.record.timestamp.hour(), 22);
        assert_eq!(
            result.record.local_date(),
            NaiveDate::from_ymd_opt(2024, 5, 31).unwrap()
        );
    }

    #[test]
    fn test_api_record_accepts_offset_and_bare_timestamps() {
        let normalizer = RecordNormalizer::new(New_York, 4);
        let offset = normalizer
            .normalize(&api("2024-01-10T09:00:00-05:00", Some(4), Some(4)))
            .unwrap();
        assert_eq!(offset.record.timestamp.hour(), 9);

        let bare = normalizer
            .normalize(&api("2024-01-10T14:00:00", Some(4), Some(4)))
            .unwrap();
        assert_eq!(bare.record.timestamp.hour(), 9);
    }

    #[test]
    fn test_api_record_rejects_non_positive_capacity() {
        let normalizer = RecordNormalizer::new(New_York, 4);
        let result = normalizer.normalize(&api("2024-06-01T14:00:00Z", Some(0), Some(0)));
        assert_eq!(result, Err(MalformedRecordError::NonPositiveCapacity(0)));
    }

    #[test]
    fn test_api_record_rejects_missing_capacity() {
        let normalizer = RecordNormalizer::new(New_York, 4);
        let result = normalizer.normalize(&api("2024-06-01T14:00:00Z", None, Some(0)));
        assert_eq!(result, Err(MalformedRecordError::MissingField("capacity")));
    }

    #[test]
    fn test_api_record_clamps_overbooked_and_underbooked() {
        let normalizer = RecordNormalizer::new(New_York, 4);

        let over = normalizer
            .normalize(&api("2024-06-01T14:00:00Z", Some(4), Some(-2)))
            .unwrap();
        assert_eq!(over.record.booked, 4);
        assert!(over.flags.clamped);

        let under = normalizer
            .normalize(&api("2024-06-01T14:00:00Z", Some(4), Some(6)))
            .unwrap();
        assert_eq!(under.record.booked, 0);
        assert!(under.flags.clamped);
    }

    #[test]
    fn test_api_record_rejects_blank_location() {
        let raw = RawRecord::Api(ApiClass {
            id: None,
            start_datetime: Some("2024-06-01T14:00:00Z".to_string()),
            capacity: Some(4),
            available_spot_count: Some(1),
            location: Some(ApiLocation {
                name: "  ".to_string(),
            }),
        });
        let result = RecordNormalizer::new(New_York, 4).normalize(&raw);
        assert_eq!(result, Err(MalformedRecordError::EmptyLocation));
    }
}
