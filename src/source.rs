//! Ingestion boundary: both adapters produce [`RawRecord`]s for a date range.

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use chrono::{Days, NaiveDate};
use indicatif::ProgressBar;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::cache::ResponseCache;
use crate::fetch_error::FetchError;
use crate::fetcher::ClassesFetcher;
use crate::record::RawRecord;
use crate::schedule_page::{parse_schedule_frame, PageProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SourceKind {
    /// Backend classes API
    Api,
    /// Booking widget schedule frames
    Scrape,
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "api" => Ok(SourceKind::Api),
            "scrape" => Ok(SourceKind::Scrape),
            other => Err(format!("unknown source '{other}', expected 'api' or 'scrape'")),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Api => f.write_str("api"),
            SourceKind::Scrape => f.write_str("scrape"),
        }
    }
}

/// Inclusive range of local calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// `None` when `end` precedes `start`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn single(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }

    /// Consecutive non-overlapping chunks of at most `days` days.
    pub fn chunks(&self, days: u32) -> Vec<DateRange> {
        let span = u64::from(days.max(1));
        let mut chunks = Vec::new();
        let mut start = self.start;
        while start <= self.end {
            let end = start
                .checked_add_days(Days::new(span - 1))
                .map_or(self.end, |d| d.min(self.end));
            chunks.push(DateRange { start, end });
            match end.checked_add_days(Days::new(1)) {
                Some(next) => start = next,
                None => break,
            }
        }
        chunks
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}..={}", self.start, self.end)
        }
    }
}

pub trait RecordSource {
    fn fetch(&self, range: DateRange) -> impl Future<Output = Result<Vec<RawRecord>, FetchError>>;

    /// Largest range a single fetch should cover; a failure loses at most this much.
    fn chunk_days(&self, configured: u32) -> u32 {
        configured
    }
}

pub struct ApiSource<C> {
    fetcher: ClassesFetcher<C>,
}

impl<C: ResponseCache> ApiSource<C> {
    pub fn new(fetcher: ClassesFetcher<C>) -> Self {
        Self { fetcher }
    }
}

impl<C: ResponseCache> RecordSource for ApiSource<C> {
    async fn fetch(&self, range: DateRange) -> Result<Vec<RawRecord>, FetchError> {
        self.fetcher.fetch_range(range.start, range.end).await
    }
}

pub struct ScrapeSource<P> {
    provider: P,
    default_location: String,
}

impl<P: PageProvider> ScrapeSource<P> {
    pub fn new(provider: P, default_location: String) -> Self {
        Self {
            provider,
            default_location,
        }
    }
}

impl<P: PageProvider> RecordSource for ScrapeSource<P> {
    async fn fetch(&self, range: DateRange) -> Result<Vec<RawRecord>, FetchError> {
        let mut records = Vec::new();
        for date in range.days() {
            let html = self.provider.frame_html(date).await?;
            let slots = parse_schedule_frame(&html, date, &self.default_location)?;
            records.extend(slots.into_iter().map(RawRecord::Scraped));
        }
        Ok(records)
    }

    /// Pages are per date, so each date succeeds or fails on its own.
    fn chunk_days(&self, _configured: u32) -> u32 {
        1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedRange {
    pub range: DateRange,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct Collected {
    pub records: Vec<RawRecord>,
    pub failed: Vec<FailedRange>,
}

/// Fetches `range` chunk by chunk. A failed chunk is recorded and skipped;
/// records from the other chunks are kept.
#[instrument(skip(source, progress), fields(range = %range))]
pub async fn collect<S: RecordSource>(
    source: &S,
    range: DateRange,
    chunk_days: u32,
    progress: &ProgressBar,
) -> Collected {
    let chunks = range.chunks(source.chunk_days(chunk_days));
    progress.set_length(chunks.len() as u64);

    let mut collected = Collected::default();
    for chunk in chunks {
        progress.set_message(chunk.to_string());
        match source.fetch(chunk).await {
            Ok(records) => {
                if records.is_empty() {
                    warn!("No records returned for {}", chunk);
                } else {
                    info!("Fetched {} raw records for {}", records.len(), chunk);
                }
                collected.records.extend(records);
            }
            Err(e) => {
                error!("Failed to fetch {}: {}", chunk, e);
                collected.failed.push(FailedRange {
                    range: chunk,
                    error: e.to_string(),
                });
            }
        }
        progress.inc(1);
    }

    progress.finish_with_message(format!(
        "{} raw records, {} failed ranges",
        collected.records.len(),
        collected.failed.len()
    ));
    collected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_chunks_cover_range_without_overlap() {
        let range = DateRange::new(d(2024, 1, 1), d(2024, 1, 10)).unwrap();
        let chunks = range.chunks(4);
        assert_eq!(
            chunks,
            vec![
                DateRange::new(d(2024, 1, 1), d(2024, 1, 4)).unwrap(),
                DateRange::new(d(2024, 1, 5), d(2024, 1, 8)).unwrap(),
                DateRange::new(d(2024, 1, 9), d(2024, 1, 10)).unwrap(),
            ]
        );
    }

    #[test]
    fn test_single_day_chunks() {
        let range = DateRange::new(d(2024, 2, 28), d(2024, 3, 1)).unwrap();
        let chunks = range.chunks(1);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1], DateRange::single(d(2024, 2, 29)));
    }

    #[test]
    fn test_zero_chunk_days_treated_as_one() {
        let range = DateRange::new(d(2024, 1, 1), d(2024, 1, 2)).unwrap();
        assert_eq!(range.chunks(0).len(), 2);
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        assert!(DateRange::new(d(2024, 1, 2), d(2024, 1, 1)).is_none());
    }

    #[test]
    fn test_days_iterates_inclusive() {
        let range = DateRange::new(d(2024, 12, 30), d(2025, 1, 2)).unwrap();
        let days: Vec<NaiveDate> = range.days().collect();
        assert_eq!(days.len(), 4);
        assert_eq!(days[3], d(2025, 1, 2));
    }

    #[test]
    fn test_source_kind_parse() {
        assert_eq!("API".parse::<SourceKind>().unwrap(), SourceKind::Api);
        assert_eq!("scrape".parse::<SourceKind>().unwrap(), SourceKind::Scrape);
        assert!("browser".parse::<SourceKind>().is_err());
    }
}
