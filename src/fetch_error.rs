use crate::cache::CacheError;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Failed to decode JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Response cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("Pagination returned to an already fetched page: {0}")]
    PaginationLoop(String),
    #[error("Expected page element not found: {0}")]
    MissingElement(String),
    #[error("Failed to read page snapshot: {0}")]
    Io(#[from] std::io::Error),
}
