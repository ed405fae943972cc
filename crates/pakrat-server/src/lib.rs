pub use error::ServerError;
pub use worker::{Worker, WorkerStartupError};

mod error;
mod files;
mod npm;
mod pypi;
mod response;
mod worker;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use moka::sync::Cache;
use tower_http::trace::TraceLayer;
use tracing::info;

use pakrat_client::{MetadataCache, UpstreamClient};
use pakrat_filename::RegistryKind;
use pakrat_kv::KvStore;
use pakrat_rewriter::Rewritten;
use pakrat_storage::FileStore;

/// Everything the request handlers need, constructed once at startup and
/// shared by reference. There is no other global state.
pub struct AppState {
    config: ProxyConfig,
    kv: KvStore,
    cache: MetadataCache,
    store: Arc<dyn FileStore>,
    /// Process-local cache of rewriting work, keyed by the raw upstream
    /// payload: rewriting is a pure function of the payload, and index pages
    /// with thousands of links are expensive to re-parse on every request.
    rewrite_cache: Cache<String, Arc<Rewritten>>,
}

/// Server-side configuration, derived from the environment by the binary.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub kind: RegistryKind,
    /// Upstream base URL, no trailing slash.
    pub upstream_url: String,
    /// Externally visible base URL used in rewritten links, no trailing
    /// slash.
    pub public_url: String,
    /// On a storage miss, refuse with 503 instead of redirecting the client
    /// to the upstream.
    pub strict: bool,
    /// Metadata TTL, seconds.
    pub cache_ttl_seconds: u64,
}

impl AppState {
    pub fn new(
        config: ProxyConfig,
        kv: KvStore,
        client: UpstreamClient,
        store: Arc<dyn FileStore>,
    ) -> Arc<Self> {
        let cache = MetadataCache::new(kv.clone(), client, config.cache_ttl_seconds);
        let mut rewrite_cache = Cache::builder().max_capacity(256);
        if config.cache_ttl_seconds > 0 {
            rewrite_cache =
                rewrite_cache.time_to_live(Duration::from_secs(config.cache_ttl_seconds));
        }
        Arc::new(Self {
            config,
            kv,
            cache,
            store,
            rewrite_cache: rewrite_cache.build(),
        })
    }

    fn upstream_url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.upstream_url)
    }

    /// Rewrite a payload through the process-local cache.
    ///
    /// On a miss the pass runs and its bindings are registered in one
    /// pipelined KV write; on a hit the bindings are already durable and
    /// registration is skipped.
    async fn rewrite_cached<F>(
        &self,
        payload: &str,
        rewrite: F,
    ) -> Result<Arc<Rewritten>, ServerError>
    where
        F: FnOnce(&str) -> Result<Rewritten, pakrat_rewriter::RewriteError>,
    {
        if let Some(hit) = self.rewrite_cache.get(payload) {
            return Ok(hit);
        }
        let rewritten = Arc::new(rewrite(payload)?);
        self.kv.bulk_put_filekeys(&rewritten.bindings).await?;
        self.rewrite_cache
            .insert(payload.to_string(), Arc::clone(&rewritten));
        Ok(rewritten)
    }
}

/// Build the route set for the configured registry flavor.
pub fn router(state: Arc<AppState>) -> Router {
    let router = match state.config.kind {
        RegistryKind::Pypi => Router::new()
            .route("/simple/{project}/", get(pypi::simple_index))
            .route("/pypi/{project}/json", get(pypi::project_json))
            .route("/pypi/{project}/{version}/json", get(pypi::project_version_json))
            .route("/file/{filekey}", get(files::pypi_file)),
        // npm package paths may contain slashes (scoped packages) and the
        // file separator `/-/` can appear anywhere in them, so everything
        // except the keys endpoint goes through one dispatcher.
        RegistryKind::Npm => Router::new()
            .route("/-/npm/v1/keys", get(npm::keys))
            .fallback(npm::dispatch),
    };
    router
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server until ctrl-c.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {addr}");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await
}
