//! Raw-response cache keyed by canonical request identity.
//!
//! A request's identity is its URL with every query parameter (those already
//! on the URL plus any passed separately) sorted by name then value. Entries
//! are written once and never expire; a hit always wins over the network.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use reqwest::Url;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cached payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid request URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    canonical: String,
}

impl CacheKey {
    pub fn new(url: &str, params: &[(String, String)]) -> Result<Self, CacheError> {
        let mut parsed = Url::parse(url).map_err(|e| CacheError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let mut pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .chain(params.iter().cloned())
            .collect();
        pairs.sort();

        parsed.set_query(None);
        if !pairs.is_empty() {
            parsed.query_pairs_mut().extend_pairs(pairs);
        }

        Ok(Self {
            canonical: parsed.to_string(),
        })
    }

    /// The canonical URL, which is also the URL to request.
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// Hex SHA-256 of the canonical URL.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical.as_bytes());
        hex::encode(hasher.finalize())
    }
}

pub trait ResponseCache {
    fn get(&self, key: &CacheKey) -> Result<Option<Value>, CacheError>;

    /// Stores `value` unless `key` already has an entry.
    fn put(&self, key: &CacheKey, value: &Value) -> Result<(), CacheError>;
}

/// One JSON file per request under a directory.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.digest()))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> CacheError {
    CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl ResponseCache for FileCache {
    fn get(&self, key: &CacheKey) -> Result<Option<Value>, CacheError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).map_err(|e| io_error(&path, e))?;
        debug!(path = %path.display(), key = key.as_str(), "Cache hit");
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn put(&self, key: &CacheKey, value: &Value) -> Result<(), CacheError> {
        let path = self.path_for(key);
        if path.exists() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir).map_err(|e| io_error(&self.dir, e))?;

        // Readers only ever see complete files.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(value)?).map_err(|e| io_error(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| io_error(&path, e))?;
        debug!(path = %path.display(), key = key.as_str(), "Cached response");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<CacheKey, Value>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResponseCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Result<Option<Value>, CacheError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &CacheKey, value: &Value) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.entry(key.clone()).or_insert_with(|| value.clone());
        Ok(())
    }
}

impl<C: ResponseCache + ?Sized> ResponseCache for &C {
    fn get(&self, key: &CacheKey) -> Result<Option<Value>, CacheError> {
        (**self).get(key)
    }

    fn put(&self, key: &CacheKey, value: &Value) -> Result<(), CacheError> {
        (**self).put(key, value)
    }
}

impl<C: ResponseCache + ?Sized> ResponseCache for std::sync::Arc<C> {
    fn get(&self, key: &CacheKey) -> Result<Option<Value>, CacheError> {
        (**self).get(key)
    }

    fn put(&self, key: &CacheKey, value: &Value) -> Result<(), CacheError> {
        (**self).put(key, value)
    }
}
