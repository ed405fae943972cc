use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pakrat_client::{MetadataCache, UpstreamClientBuilder};
use pakrat_filename::RegistryKind;
use pakrat_kv::KvStore;

fn kv() -> KvStore {
    KvStore::in_memory("pakrat", RegistryKind::Pypi)
}

#[tokio::test]
async fn fetch_filters_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/simple/requests/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html></html>")
                .insert_header("content-type", "text/html")
                .insert_header("x-served-by", "cache-iad-1")
                .insert_header("server", "nginx")
                .insert_header("etag", "\"abc\""),
        )
        .mount(&server)
        .await;

    let client = UpstreamClientBuilder::new().retries(0).build().unwrap();
    let entry = client
        .fetch(&format!("{}/simple/requests/", server.uri()))
        .await
        .unwrap();

    assert_eq!(entry.status_code, 200);
    assert_eq!(entry.content, "<html></html>");
    let names: Vec<&str> = entry.headers.iter().map(|(name, _)| name.as_str()).collect();
    assert!(names.contains(&"content-type"));
    assert!(names.contains(&"etag"));
    for forbidden in ["content-length", "server", "x-served-by", "date", "connection"] {
        assert!(!names.contains(&forbidden), "{forbidden} leaked through");
    }
}

#[tokio::test]
async fn fetch_caches_negative_answers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/simple/nope/"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let client = UpstreamClientBuilder::new().retries(0).build().unwrap();
    let entry = client
        .fetch(&format!("{}/simple/nope/", server.uri()))
        .await
        .unwrap();
    assert_eq!(entry.status_code, 404);
    assert_eq!(entry.content, "not found");
}

#[tokio::test]
async fn fetch_rejects_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let client = UpstreamClientBuilder::new().retries(0).build().unwrap();
    let err = client.fetch(&server.uri()).await.unwrap_err();
    assert!(err.to_string().contains("502"), "{err}");
}

#[tokio::test]
async fn fetch_attaches_basic_auth_and_user_agent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        // "user:s3cret"
        .and(header("authorization", "Basic dXNlcjpzM2NyZXQ="))
        .and(header("user-agent", concat!("pakrat/", env!("CARGO_PKG_VERSION"))))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let client = UpstreamClientBuilder::new()
        .retries(0)
        .credentials(Some("user".to_string()), Some("s3cret".to_string()))
        .build()
        .unwrap();
    let entry = client.fetch(&server.uri()).await.unwrap();
    assert_eq!(entry.status_code, 200);
}

#[tokio::test]
async fn metadata_cache_serves_fresh_entries_without_refetching() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/simple/requests/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("payload"))
        .expect(1)
        .mount(&server)
        .await;

    let client = UpstreamClientBuilder::new().retries(0).build().unwrap();
    let cache = MetadataCache::new(kv(), client, 3600);
    let url = format!("{}/simple/requests/", server.uri());

    let first = cache.get(&url).await.unwrap();
    let second = cache.get(&url).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(second.content, "payload");
}

#[tokio::test]
async fn metadata_cache_zero_ttl_always_refreshes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/simple/requests/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("payload"))
        .expect(2)
        .mount(&server)
        .await;

    let client = UpstreamClientBuilder::new().retries(0).build().unwrap();
    let cache = MetadataCache::new(kv(), client, 0);
    let url = format!("{}/simple/requests/", server.uri());

    cache.get(&url).await.unwrap();
    cache.get(&url).await.unwrap();
}

#[tokio::test]
async fn metadata_cache_masks_outage_with_stale_entry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/simple/requests/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("good payload"))
        .mount(&server)
        .await;

    let client = UpstreamClientBuilder::new().retries(0).build().unwrap();
    let cache = MetadataCache::new(kv(), client, 0);
    let url = format!("{}/simple/requests/", server.uri());

    let fresh = cache.get(&url).await.unwrap();
    assert_eq!(fresh.content, "good payload");

    // The upstream starts failing; the expired entry still answers.
    server.reset().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let stale = cache.get(&url).await.unwrap();
    assert_eq!(stale.status_code, 200);
    assert_eq!(stale.content, "good payload");
}

#[tokio::test]
async fn metadata_cache_synthesizes_503_when_nothing_cached() {
    let client = UpstreamClientBuilder::new().retries(0).build().unwrap();
    let cache = MetadataCache::new(kv(), client, 60);

    // Nothing listens on port 1.
    let entry = cache.get("http://127.0.0.1:1/simple/requests/").await.unwrap();
    assert_eq!(entry.status_code, 503);
    assert!(entry.content.is_empty());
    assert!(entry.headers.is_empty());
}
