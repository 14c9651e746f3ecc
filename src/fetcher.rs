use std::collections::HashSet;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use chrono::NaiveDate;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::cache::{CacheKey, ResponseCache};
use crate::fetch_error::FetchError;
use crate::record::{id_text, ApiClass, RawRecord, UndecodableClass};

/// One page of the classes endpoint. Classes stay as raw JSON here so a
/// single malformed entry cannot fail the page.
#[derive(Debug, Deserialize)]
struct ClassesPage {
    results: Vec<Value>,
    #[serde(default)]
    next: Option<String>,
}

/// Client for the paginated customer classes endpoint, reading through a
/// [`ResponseCache`].
pub struct ClassesFetcher<C> {
    client: reqwest::Client,
    base_url: String,
    region: String,
    page_size: u32,
    max_retries: usize,
    cache: C,
}

impl<C: ResponseCache> ClassesFetcher<C> {
    pub fn new(base_url: String, region: String, cache: C) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            region,
            page_size: 500,
            max_retries: 3,
            cache,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, FetchError> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// All classes starting between `start` and `end` inclusive, following
    /// `next` links until the last page.
    ///
    /// A class whose ID was already seen on an earlier page is dropped.
    /// Entries that do not decode come back as [`RawRecord::Undecodable`].
    #[instrument(skip(self), fields(base_url = %self.base_url, region = %self.region))]
    pub async fn fetch_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawRecord>, FetchError> {
        // Query parameters only go on the first request; `next` links carry their own.
        let mut params = Some(vec![
            ("min_start_date".to_string(), start.format("%Y-%m-%d").to_string()),
            ("max_start_date".to_string(), end.format("%Y-%m-%d").to_string()),
            ("page_size".to_string(), self.page_size.to_string()),
            ("region".to_string(), self.region.clone()),
            ("format".to_string(), "json".to_string()),
        ]);

        let mut next_url = Some(self.base_url.clone());
        let mut visited = HashSet::new();
        let mut seen_ids = HashSet::new();
        let mut records = Vec::new();
        let mut duplicates = 0;

        while let Some(url) = next_url.take() {
            let key = CacheKey::new(&url, &params.take().unwrap_or_default())?;
            if !visited.insert(key.clone()) {
                return Err(FetchError::PaginationLoop(key.as_str().to_string()));
            }

            let page = self.fetch_page(&key).await?;
            debug!("Page {} returned {} classes", visited.len(), page.results.len());

            for entry in page.results {
                let record = decode_class(entry);
                if let RawRecord::Api(class) = &record {
                    if let Some(id) = class.class_id() {
                        if !seen_ids.insert(id) {
                            duplicates += 1;
                            continue;
                        }
                    }
                }
                records.push(record);
            }
            next_url = page.next.map(|next| self.resolve(&next)).transpose()?;
        }

        if duplicates > 0 {
            debug!("Dropped {} classes repeated across pages", duplicates);
        }
        debug!("Fetched {} classes over {} pages", records.len(), visited.len());
        Ok(records)
    }

    fn resolve(&self, next: &str) -> Result<String, FetchError> {
        let base = Url::parse(&self.base_url)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {e}", self.base_url)))?;
        base.join(next)
            .map(|url| url.to_string())
            .map_err(|e| FetchError::InvalidUrl(format!("{next}: {e}")))
    }

    async fn fetch_page(&self, key: &CacheKey) -> Result<ClassesPage, FetchError> {
        if let Some(cached) = self.cache.get(key)? {
            return Ok(ClassesPage::deserialize(&cached)?);
        }

        let value = self.get_json(key.as_str()).await?;
        // Bodies without a page shape (throttle notices, error objects) are never cached.
        let page = ClassesPage::deserialize(&value)?;
        self.cache.put(key, &value)?;
        Ok(page)
    }

    async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        // Starts at 500ms, doubles each time, caps at 10s
        let mut delays = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(500))
            .with_max_delay(Duration::from_secs(10))
            .with_max_times(self.max_retries)
            .with_jitter()
            .build();

        loop {
            match self.get_json_once(url).await {
                Err(err) if is_transient(&err) => match delays.next() {
                    Some(delay) => {
                        warn!("Request to {} failed ({}), retrying in {:?}", url, err, delay);
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(err),
                },
                result => return result,
            }
        }
    }

    async fn get_json_once(&self, url: &str) -> Result<Value, FetchError> {
        debug!("Sending HTTP request: {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.json::<Value>().await?)
    }
}

fn decode_class(entry: Value) -> RawRecord {
    let id = entry.get("id").and_then(id_text);
    match serde_json::from_value::<ApiClass>(entry) {
        Ok(class) => RawRecord::Api(class),
        Err(e) => {
            warn!(id = ?id, "Class entry does not decode: {}", e);
            RawRecord::Undecodable(UndecodableClass {
                id,
                reason: e.to_string(),
            })
        }
    }
}

fn is_transient(err: &FetchError) -> bool {
    match err {
        FetchError::Request(e) => e.is_timeout() || e.is_connect(),
        FetchError::Status { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}
