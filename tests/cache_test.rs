// Tests for the on-disk response cache

use chrono::NaiveDate;
use golf_utilization::cache::{CacheKey, FileCache, ResponseCache};
use golf_utilization::fetcher::ClassesFetcher;
use mockito::{Matcher, Server};
use serde_json::json;
use tempfile::TempDir;

fn key(url: &str, pairs: &[(&str, &str)]) -> CacheKey {
    let params: Vec<(String, String)> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    CacheKey::new(url, &params).unwrap()
}

#[test]
fn test_file_cache_stores_one_file_per_request() {
    let dir = TempDir::new().unwrap();
    let cache = FileCache::new(dir.path().join("responses"));
    let key = key("https://example.com/classes", &[("region", "48541")]);

    assert!(cache.get(&key).unwrap().is_none());
    cache.put(&key, &json!({"results": [], "next": null})).unwrap();

    let expected = cache.dir().join(format!("{}.json", key.digest()));
    assert!(expected.exists());
    assert_eq!(std::fs::read_dir(cache.dir()).unwrap().count(), 1);
}

#[test]
fn test_file_cache_is_write_once() {
    let dir = TempDir::new().unwrap();
    let cache = FileCache::new(dir.path());
    let key = key("https://example.com/classes", &[("page", "1")]);

    cache.put(&key, &json!({"version": 1})).unwrap();
    cache.put(&key, &json!({"version": 2})).unwrap();

    assert_eq!(cache.get(&key).unwrap(), Some(json!({"version": 1})));
}

#[test]
fn test_file_cache_survives_new_instance() {
    let dir = TempDir::new().unwrap();
    let first = key("https://example.com/classes", &[("region", "48541"), ("page_size", "500")]);
    FileCache::new(dir.path())
        .put(&first, &json!({"results": [{"id": "1"}]}))
        .unwrap();

    // Same request with parameters in a different order
    let reopened = FileCache::new(dir.path());
    let second = key("https://example.com/classes", &[("page_size", "500"), ("region", "48541")]);
    assert_eq!(
        reopened.get(&second).unwrap(),
        Some(json!({"results": [{"id": "1"}]}))
    );
}

#[test]
fn test_corrupt_entry_is_an_error() {
    let dir = TempDir::new().unwrap();
    let cache = FileCache::new(dir.path());
    let key = key("https://example.com/classes", &[]);
    std::fs::write(dir.path().join(format!("{}.json", key.digest())), "{not json").unwrap();

    assert!(cache.get(&key).is_err());
}

#[tokio::test]
async fn test_second_run_reads_from_disk() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/classes")
        .match_query(Matcher::UrlEncoded("min_start_date".into(), "2024-06-03".into()))
        .with_status(200)
        .with_body(
            json!({
                "results": [{
                    "id": "1",
                    "start_datetime": "2024-06-03T23:00:00Z",
                    "capacity": 4,
                    "available_spot_count": 2,
                    "location": { "name": "Tribeca" }
                }],
                "next": null
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let day = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
    let url = format!("{}/classes", server.url());

    let first = ClassesFetcher::new(url.clone(), "48541".to_string(), FileCache::new(dir.path()))
        .with_max_retries(0)
        .fetch_range(day, day)
        .await
        .unwrap();
    let second = ClassesFetcher::new(url, "48541".to_string(), FileCache::new(dir.path()))
        .with_max_retries(0)
        .fetch_range(day, day)
        .await
        .unwrap();

    assert_eq!(first.len(), 1);
    assert_eq!(first, second);
    mock.assert_async().await;
}
