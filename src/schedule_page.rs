//! Slot extraction from the booking widget's embedded schedule frame.
//!
//! Driving a browser to render the widget is left to a [`PageProvider`]; this
//! module only needs the frame's HTML for one date.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument, warn};

use crate::fetch_error::FetchError;
use crate::record::ScrapedSlot;

const SLOT_SELECTOR: &str =
    r#"div[data-testid*="time-slot"], div[class*="TimeSlot"], div[class*="time-slot"]"#;
const TIME_SELECTOR: &str = r#"p[class*="time"], span[class*="time"]"#;
const STATUS_SELECTOR: &str = r#"p[class*="status"], span[class*="status"]"#;
const LOCATION_SELECTOR: &str = r#"p[class*="LineItem"], span[class*="location"]"#;

/// Supplies the rendered schedule frame for a date.
pub trait PageProvider {
    fn frame_html(&self, date: NaiveDate) -> impl Future<Output = Result<String, FetchError>>;
}

/// Reads frame snapshots saved as `frame_<YYYY-MM-DD>.html` in a directory.
#[derive(Debug, Clone)]
pub struct SnapshotPageProvider {
    dir: PathBuf,
}

impl SnapshotPageProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn snapshot_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("frame_{}.html", date.format("%Y-%m-%d")))
    }
}

impl PageProvider for SnapshotPageProvider {
    async fn frame_html(&self, date: NaiveDate) -> Result<String, FetchError> {
        let path = self.snapshot_path(date);
        debug!("Reading frame snapshot {}", path.display());
        Ok(tokio::fs::read_to_string(&path).await?)
    }
}

/// Fetches the schedule page over plain HTTP. Only useful when the endpoint
/// serves already-rendered markup.
#[derive(Debug, Clone)]
pub struct HttpPageProvider {
    client: reqwest::Client,
    url_template: String,
}

impl HttpPageProvider {
    pub fn new(url_template: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url_template,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, FetchError> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    /// Substitutes `{date}` in the template with the ISO date.
    pub fn url_for(&self, date: NaiveDate) -> String {
        self.url_template
            .replace("{date}", &date.format("%Y-%m-%d").to_string())
    }
}

impl PageProvider for HttpPageProvider {
    async fn frame_html(&self, date: NaiveDate) -> Result<String, FetchError> {
        let url = self.url_for(date);
        debug!("Sending HTTP request to schedule page: {}", url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url,
            });
        }
        Ok(response.text().await?)
    }
}

fn selector(css: &str) -> Result<Selector, FetchError> {
    Selector::parse(css)
        .map_err(|e| FetchError::MissingElement(format!("bad selector {css}: {e}")))
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extracts every slot from a schedule frame for `date`.
///
/// Slots lacking a location use `default_location`. Only the innermost
/// matches are read: an element that contains another slot match is a
/// wrapper, not a slot. A frame with no slot containers at all is an error.
#[instrument(skip(html, default_location), fields(html_size = html.len()))]
pub fn parse_schedule_frame(
    html: &str,
    date: NaiveDate,
    default_location: &str,
) -> Result<Vec<ScrapedSlot>, FetchError> {
    let document = Html::parse_document(html);
    let slot_selector = selector(SLOT_SELECTOR)?;
    let time_selector = selector(TIME_SELECTOR)?;
    let status_selector = selector(STATUS_SELECTOR)?;
    let location_selector = selector(LOCATION_SELECTOR)?;

    let containers: Vec<ElementRef<'_>> = document
        .select(&slot_selector)
        .filter(|slot| {
            !slot
                .descendants()
                .skip(1)
                .filter_map(ElementRef::wrap)
                .any(|inner| slot_selector.matches(&inner))
        })
        .collect();

    if containers.is_empty() {
        warn!("No time slot elements found in schedule frame");
        debug!(
            "HTML preview (first 500 chars): {}",
            &html.chars().take(500).collect::<String>()
        );
        return Err(FetchError::MissingElement(format!("time slots for {date}")));
    }

    let mut slots = Vec::new();
    let mut skipped = 0;

    for (index, container) in containers.iter().enumerate() {
        let time = container.select(&time_selector).next().map(element_text);
        let status = container.select(&status_selector).next().map(element_text);
        let location = container
            .select(&location_selector)
            .next()
            .map(element_text)
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| default_location.to_string());

        match (time, status) {
            (Some(time), Some(status)) => {
                debug!("Slot {}: {} at {} - {}", index, time, location, status);
                slots.push(ScrapedSlot {
                    date,
                    time,
                    location,
                    status,
                });
            }
            _ => {
                debug!("Slot {} is missing a time or status element, skipping", index);
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        warn!("Skipped {} incomplete slots out of {}", skipped, containers.len());
    }
    debug!("Extracted {} slots for {}", slots.len(), date);

    Ok(slots)
}
