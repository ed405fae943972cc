use jiff::Timestamp;
use tracing::{debug, warn};

use pakrat_kv::{CacheEntry, KvError, KvStore};

use crate::UpstreamClient;

/// Get-or-refresh over the KV-backed metadata cache.
///
/// Freshness is a fixed wall-clock TTL, read-side only: entries are never
/// expired in place, because a stale entry is the fallback when the upstream
/// refuses to answer. There is no lock around refresh; concurrent misses may
/// each fetch, the last writer wins, and every observer still sees a valid
/// entry (upstream GETs are idempotent).
#[derive(Clone)]
pub struct MetadataCache {
    kv: KvStore,
    client: UpstreamClient,
    ttl_seconds: u64,
}

impl MetadataCache {
    pub fn new(kv: KvStore, client: UpstreamClient, ttl_seconds: u64) -> Self {
        Self {
            kv,
            client,
            ttl_seconds,
        }
    }

    pub fn client(&self) -> &UpstreamClient {
        &self.client
    }

    /// Return the cached entry for `url`, refreshing it when stale.
    ///
    /// Only infrastructure failures propagate; upstream failures degrade to
    /// the stale entry, or to a synthetic 503 when nothing was ever cached.
    pub async fn get(&self, url: &str) -> Result<CacheEntry, KvError> {
        let cached = self.kv.get_cache(url).await?;

        if let Some((stored_at, entry)) = &cached {
            if is_fresh(*stored_at, Timestamp::now(), self.ttl_seconds) {
                debug!(url, "metadata cache hit");
                return Ok(entry.clone());
            }
        }

        match self.client.fetch(url).await {
            Ok(entry) => {
                self.kv.set_cache(url, &entry).await?;
                debug!(url, "metadata cache refreshed");
                Ok(entry)
            }
            Err(err) => match cached {
                Some((_, stale)) => {
                    warn!(url, error = %err, "upstream refresh failed, serving stale entry");
                    Ok(stale)
                }
                None => {
                    warn!(url, error = %err, "upstream unreachable and nothing cached");
                    Ok(CacheEntry::unavailable())
                }
            },
        }
    }
}

/// `stored_at` is fresh while strictly younger than the TTL: a zero TTL
/// always refreshes.
fn is_fresh(stored_at: Timestamp, now: Timestamp, ttl_seconds: u64) -> bool {
    let age = now.as_second().saturating_sub(stored_at.as_second());
    age < i64::try_from(ttl_seconds).unwrap_or(i64::MAX)
}
