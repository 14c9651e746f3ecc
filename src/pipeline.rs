use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::aggregate::Rollups;
use crate::normalizer::RecordNormalizer;
use crate::record::{CanonicalRecord, RawRecord};

/// Tally of everything the pipeline did not take at face value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub raw_records: usize,
    pub normalized: usize,
    /// Labels no rule recognized; counted as 0 booked.
    pub flagged_labels: usize,
    /// Booked counts forced into `[0, capacity]`.
    pub clamped: usize,
    /// Records excluded from aggregation.
    pub rejected: usize,
    pub failed_ranges: usize,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub records: Vec<CanonicalRecord>,
    pub rollups: Rollups,
    pub diagnostics: Diagnostics,
}

/// Normalizes every raw record and aggregates the survivors. Never fails:
/// malformed records are rejected and counted.
#[instrument(skip_all)]
pub fn run<'a, I>(normalizer: &RecordNormalizer, raw: I) -> PipelineOutput
where
    I: IntoIterator<Item = &'a RawRecord>,
{
    let mut diagnostics = Diagnostics::default();
    let mut records = Vec::new();

    for record in raw {
        diagnostics.raw_records += 1;
        match normalizer.normalize(record) {
            Ok(normalized) => {
                if normalized.flags.unrecognized_label {
                    diagnostics.flagged_labels += 1;
                }
                if normalized.flags.clamped {
                    diagnostics.clamped += 1;
                }
                diagnostics.normalized += 1;
                records.push(normalized.record);
            }
            Err(e) => {
                warn!("Rejected record: {} ({:?})", e, record);
                diagnostics.rejected += 1;
            }
        }
    }

    let rollups = Rollups::from_records(&records);
    info!(
        raw = diagnostics.raw_records,
        normalized = diagnostics.normalized,
        flagged_labels = diagnostics.flagged_labels,
        clamped = diagnostics.clamped,
        rejected = diagnostics.rejected,
        hour_slots = rollups.hours.len(),
        days = rollups.days.len(),
        "Pipeline complete"
    );

    PipelineOutput {
        records,
        rollups,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ApiClass, ApiLocation, ScrapedSlot};
    use chrono::NaiveDate;
    use chrono_tz::America::New_York;

    fn slot(time: &str, status: &str) -> RawRecord {
        RawRecord::Scraped(ScrapedSlot {
            date: NaiveDate::from_ymd_opt(2025, 4, 28).unwrap(),
            time: time.to_string(),
            location: "Tribeca".to_string(),
            status: status.to_string(),
        })
    }

    #[test]
    fn test_diagnostics_count_each_outcome() {
        let raw = vec![
            slot("7:00 PM", "3/4 Open"),
            slot("8:00 PM", "garbage"),
            slot("not a time", "Waitlist"),
            RawRecord::Api(ApiClass {
                id: None,
                start_datetime: Some("2025-04-28T23:00:00Z".to_string()),
                capacity: Some(4),
                available_spot_count: Some(9),
                location: Some(ApiLocation {
                    name: "Tribeca".to_string(),
                }),
            }),
        ];

        let output = run(&RecordNormalizer::new(New_York, 4), &raw);
        assert_eq!(
            output.diagnostics,
            Diagnostics {
                raw_records: 4,
                normalized: 3,
                flagged_labels: 1,
                clamped: 1,
                rejected: 1,
                failed_ranges: 0,
            }
        );
        assert_eq!(output.records.len(), 3);
        // 19:00 EDT slot from both shapes lands in one hour rollup
        assert_eq!(output.rollups.hours.len(), 2);
        assert!(output.records.iter().all(|r| r.booked <= r.capacity));
    }
}
