use std::sync::Arc;

use axum::body::Body;
use http::{Request, StatusCode};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pakrat_client::UpstreamClientBuilder;
use pakrat_filename::RegistryKind;
use pakrat_kv::KvStore;
use pakrat_server::{router, AppState, ProxyConfig};
use pakrat_storage::LocalStore;

struct Proxy {
    upstream: MockServer,
    kv: KvStore,
    state: Arc<AppState>,
    _dir: tempfile::TempDir,
}

async fn proxy(strict: bool) -> Proxy {
    let upstream = MockServer::start().await;
    let kv = KvStore::in_memory("pakrat", RegistryKind::Npm);
    let client = UpstreamClientBuilder::new().retries(0).build().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalStore::new(RegistryKind::Npm, client.clone(), dir.path()).unwrap());

    let state = AppState::new(
        ProxyConfig {
            kind: RegistryKind::Npm,
            upstream_url: upstream.uri(),
            public_url: "http://proxy.local".to_string(),
            strict,
            cache_ttl_seconds: 300,
        },
        kv.clone(),
        client,
        store,
    );

    Proxy { upstream, kv, state, _dir: dir }
}

impl Proxy {
    async fn get(&self, uri: &str) -> http::Response<Body> {
        router(Arc::clone(&self.state))
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }
}

async fn body_string(response: http::Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn package_document_is_rewritten_and_bound() {
    let proxy = proxy(false).await;
    let doc = format!(
        r#"{{"name": "react", "versions": {{"18.2.0": {{"dist": {{"tarball": "{}/react/-/react-18.2.0.tgz"}}}}}}}}"#,
        proxy.upstream.uri(),
    );
    Mock::given(method("GET"))
        .and(path("/react"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(doc)
                .insert_header("content-type", "application/json"),
        )
        .mount(&proxy.upstream)
        .await;

    let response = proxy.get("/react").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("http://proxy.local/react/-/react-18.2.0.tgz"), "{body}");
    assert!(!body.contains(&proxy.upstream.uri()), "{body}");

    assert_eq!(
        proxy.kv.url_for_filekey("react/-/react-18.2.0.tgz").await.unwrap(),
        Some(format!("{}/react/-/react-18.2.0.tgz", proxy.upstream.uri())),
    );
}

#[tokio::test]
async fn scoped_packages_resolve_with_encoded_slashes() {
    let proxy = proxy(false).await;
    let doc = format!(
        r#"{{"name": "@types/node", "versions": {{"20.8.0": {{"dist": {{"tarball": "{}/@types/node/-/node-20.8.0.tgz"}}}}}}}}"#,
        proxy.upstream.uri(),
    );
    Mock::given(method("GET"))
        .and(path("/@types/node"))
        .respond_with(ResponseTemplate::new(200).set_body_string(doc))
        .mount(&proxy.upstream)
        .await;

    // npm clients encode the scope separator.
    let response = proxy.get("/@types%2fnode").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("http://proxy.local/@types/node/-/node-20.8.0.tgz"), "{body}");
}

#[tokio::test]
async fn tarball_miss_redirects_and_enqueues() {
    let proxy = proxy(false).await;
    let doc = format!(
        r#"{{"name": "react", "versions": {{"18.2.0": {{"dist": {{"tarball": "{}/react/-/react-18.2.0.tgz"}}}}}}}}"#,
        proxy.upstream.uri(),
    );
    Mock::given(method("GET"))
        .and(path("/react"))
        .respond_with(ResponseTemplate::new(200).set_body_string(doc))
        .mount(&proxy.upstream)
        .await;
    proxy.get("/react").await;

    let response = proxy.get("/react/-/react-18.2.0.tgz").await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers().get("location").unwrap().to_str().unwrap(),
        format!("{}/react/-/react-18.2.0.tgz", proxy.upstream.uri()),
    );
    assert_eq!(
        proxy.kv.dequeue_job().await.unwrap(),
        Some(format!("{}/react/-/react-18.2.0.tgz", proxy.upstream.uri())),
    );
}

#[tokio::test]
async fn unknown_tarball_is_a_client_error() {
    let proxy = proxy(false).await;
    let response = proxy.get("/react/-/react-0.0.1.tgz").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn keys_endpoint_passes_through() {
    let proxy = proxy(false).await;
    Mock::given(method("GET"))
        .and(path("/-/npm/v1/keys"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"keys": []}"#),
        )
        .mount(&proxy.upstream)
        .await;

    let response = proxy.get("/-/npm/v1/keys").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, r#"{"keys": []}"#);
}

#[tokio::test]
async fn version_documents_rewrite_their_single_dist() {
    let proxy = proxy(false).await;
    let doc = format!(
        r#"{{"name": "react", "version": "18.2.0", "dist": {{"tarball": "{}/react/-/react-18.2.0.tgz"}}}}"#,
        proxy.upstream.uri(),
    );
    Mock::given(method("GET"))
        .and(path("/react/18.2.0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(doc))
        .mount(&proxy.upstream)
        .await;

    let response = proxy.get("/react/18.2.0").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("http://proxy.local/react/-/react-18.2.0.tgz"), "{body}");
}
