//! Gemini context caches through the `ContextCacher` capability.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use unichat::{CancellationToken, Error, Message};
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::providers::{
    anthropic::AnthropicTestSetup, google::GoogleTestSetup, ProviderTestSetup,
};

const CACHES_PATH: &str = "/v1/projects/test-project/locations/europe-west1/cachedContents";
const CACHE_NAME: &str = "projects/test-project/locations/europe-west1/cachedContents/4242";

fn cached_content(id: &str, display_name: &str) -> serde_json::Value {
    json!({
        "name": format!("projects/test-project/locations/europe-west1/cachedContents/{id}"),
        "displayName": display_name,
        "model": "projects/test-project/locations/europe-west1/publishers/google/models/gemini-2.5-flash",
        "createTime": "2025-06-01T12:00:00.000000Z",
        "updateTime": "2025-06-01T12:00:00.000000Z",
        "expireTime": "2025-06-01T13:00:00.000000Z",
        "usageMetadata": {"totalTokenCount": 40123}
    })
}

#[tokio::test]
async fn test_create_cache() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CACHES_PATH))
        .and(body_json(json!({
            "model": "projects/test-project/locations/europe-west1/publishers/google/models/gemini-2.5-flash",
            "displayName": "handbook",
            "contents": [{"role": "user", "parts": [{"text": "A very long handbook."}]}],
            "systemInstruction": {"parts": [{"text": "Answer from the handbook."}]},
            "ttl": "3600s"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(cached_content("4242", "handbook")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = GoogleTestSetup::create_provider(&mock_server.uri());
    let cacher = provider.context_cacher().expect("Gemini supports context caching");
    let cache = assert_ok!(
        cacher
            .create_cache(
                &CancellationToken::new(),
                GoogleTestSetup::MODEL,
                &[
                    Message::system("Answer from the handbook."),
                    Message::user("A very long handbook."),
                ],
                "handbook",
                Duration::from_secs(3600),
            )
            .await
    );

    assert_eq!(cache.name, CACHE_NAME);
    assert_eq!(cache.display_name.as_deref(), Some("handbook"));
    assert_eq!(cache.model, "gemini-2.5-flash");
    assert_eq!(
        cache.expire_time,
        Utc.with_ymd_and_hms(2025, 6, 1, 13, 0, 0).unwrap()
    );
}

#[tokio::test]
async fn test_get_and_delete_cache_by_id_or_name() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{CACHES_PATH}/4242")))
        .respond_with(ResponseTemplate::new(200).set_body_json(cached_content("4242", "")))
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("{CACHES_PATH}/4242")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = GoogleTestSetup::create_provider(&mock_server.uri());
    let cacher = provider.context_cacher().expect("Gemini supports context caching");
    let cancel = CancellationToken::new();

    let by_id = assert_ok!(cacher.get_cache(&cancel, "4242").await);
    let by_name = assert_ok!(cacher.get_cache(&cancel, CACHE_NAME).await);
    assert_eq!(by_id, by_name);
    assert_eq!(by_id.display_name, None);

    assert_ok!(cacher.delete_cache(&cancel, CACHE_NAME).await);
}

#[tokio::test]
async fn test_list_caches_follows_pages() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CACHES_PATH))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cachedContents": [cached_content("3", "third")]
        })))
        .with_priority(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path(CACHES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cachedContents": [cached_content("1", "first"), cached_content("2", "second")],
            "nextPageToken": "page-2"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = GoogleTestSetup::create_provider(&mock_server.uri());
    let cacher = provider.context_cacher().expect("Gemini supports context caching");
    let caches = assert_ok!(cacher.list_caches(&CancellationToken::new()).await);

    let names: Vec<_> = caches
        .iter()
        .filter_map(|cache| cache.display_name.as_deref())
        .collect();
    assert_eq!(names, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_missing_cache_is_a_provider_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": 404, "message": "CachedContent not found", "status": "NOT_FOUND"}
        })))
        .mount(&mock_server)
        .await;

    let provider = GoogleTestSetup::create_provider(&mock_server.uri());
    let cacher = provider.context_cacher().expect("Gemini supports context caching");
    let error = assert_err!(cacher.get_cache(&CancellationToken::new(), "missing").await);
    assert!(matches!(error, Error::Provider { .. }), "{error:?}");
}

#[test]
fn test_only_gemini_caches() {
    let provider = AnthropicTestSetup::create_provider("http://localhost:1");
    assert!(provider.context_cacher().is_none());
}
