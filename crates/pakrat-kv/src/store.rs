use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use jiff::Timestamp;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;
use tracing::debug;

use pakrat_filename::RegistryKind;

use crate::CacheEntry;

/// The shared key-value substrate: metadata-cache entries, the
/// filekey → URL directory, and the download-job FIFO queue.
///
/// All keys are namespaced `<prefix>:<mode>:<kind>:<safe-key>` where `kind`
/// is one of `data`, `time`, `file_url`, `file_download_queue` and the
/// safe-key substitutes `_` for the `:` separator. The cache write is two
/// keys (`data` + `time`); readers treat a missing half as no entry, so the
/// pair needs no transaction.
#[derive(Clone)]
pub struct KvStore {
    conn: Conn,
    prefix: String,
}

#[derive(Clone)]
enum Conn {
    Redis(ConnectionManager),
    Memory(Arc<Mutex<Memory>>),
}

/// In-process stand-in for Redis, selected by the `memory://` URL. Used by
/// the test suites and for single-process trial runs; production deployments
/// point `REDIS_URL` at a real server.
#[derive(Debug, Default)]
struct Memory {
    strings: HashMap<String, String>,
    queue: VecDeque<String>,
}

impl KvStore {
    /// Connect to the store behind `url`, namespacing every key under
    /// `<prefix>:<kind>`.
    pub async fn open(url: &str, prefix: &str, kind: RegistryKind) -> Result<Self, KvError> {
        let conn = if url.starts_with("memory://") {
            Conn::Memory(Arc::default())
        } else {
            let client = redis::Client::open(url)?;
            Conn::Redis(client.get_connection_manager().await?)
        };
        Ok(Self {
            conn,
            prefix: format!("{prefix}:{kind}"),
        })
    }

    /// An in-process store, for tests.
    pub fn in_memory(prefix: &str, kind: RegistryKind) -> Self {
        Self {
            conn: Conn::Memory(Arc::default()),
            prefix: format!("{prefix}:{kind}"),
        }
    }

    /// Round-trip to the backing store; used as a startup reachability check.
    pub async fn ping(&self) -> Result<(), KvError> {
        match &self.conn {
            Conn::Redis(manager) => {
                let mut conn = manager.clone();
                redis::cmd("PING").query_async::<()>(&mut conn).await?;
                Ok(())
            }
            Conn::Memory(_) => Ok(()),
        }
    }

    fn data_key(&self, key: &str) -> String {
        format!("{}:data:{}", self.prefix, sanitize(key))
    }

    fn time_key(&self, key: &str) -> String {
        format!("{}:time:{}", self.prefix, sanitize(key))
    }

    fn filekey_key(&self, filekey: &str) -> String {
        format!("{}:file_url:{}", self.prefix, sanitize(filekey))
    }

    fn queue_key(&self) -> String {
        format!("{}:file_download_queue", self.prefix)
    }

    /// Write a cache entry and its timestamp. Two writes; not atomic.
    pub async fn set_cache(&self, key: &str, entry: &CacheEntry) -> Result<(), KvError> {
        let data = serde_json::to_string(entry).expect("cache entries always serialize");
        let now = Timestamp::now().to_string();
        match &self.conn {
            Conn::Redis(manager) => {
                let mut conn = manager.clone();
                let _: () = conn.set(self.data_key(key), data).await?;
                let _: () = conn.set(self.time_key(key), now).await?;
            }
            Conn::Memory(memory) => {
                let mut memory = memory.lock().unwrap();
                memory.strings.insert(self.data_key(key), data);
                memory.strings.insert(self.time_key(key), now);
            }
        }
        Ok(())
    }

    /// Read a cache entry and its write time; `None` if either half is
    /// missing.
    pub async fn get_cache(
        &self,
        key: &str,
    ) -> Result<Option<(Timestamp, CacheEntry)>, KvError> {
        let (data, time) = match &self.conn {
            Conn::Redis(manager) => {
                let mut conn = manager.clone();
                let data: Option<String> = conn.get(self.data_key(key)).await?;
                let time: Option<String> = conn.get(self.time_key(key)).await?;
                (data, time)
            }
            Conn::Memory(memory) => {
                let memory = memory.lock().unwrap();
                (
                    memory.strings.get(&self.data_key(key)).cloned(),
                    memory.strings.get(&self.time_key(key)).cloned(),
                )
            }
        };
        let (Some(data), Some(time)) = (data, time) else {
            return Ok(None);
        };

        let timestamp = time.parse::<Timestamp>().map_err(|source| KvError::Timestamp {
            key: self.time_key(key),
            source,
        })?;
        let entry = serde_json::from_str(&data).map_err(|source| KvError::Decode {
            key: self.data_key(key),
            source,
        })?;
        Ok(Some((timestamp, entry)))
    }

    /// Append a download job to the queue tail.
    pub async fn enqueue_job(&self, url: &str) -> Result<(), KvError> {
        debug!(url, "enqueueing download job");
        match &self.conn {
            Conn::Redis(manager) => {
                let mut conn = manager.clone();
                let _: () = conn.rpush(self.queue_key(), url).await?;
            }
            Conn::Memory(memory) => {
                memory.lock().unwrap().queue.push_back(url.to_string());
            }
        }
        Ok(())
    }

    /// Pop the oldest download job, if any.
    pub async fn dequeue_job(&self) -> Result<Option<String>, KvError> {
        match &self.conn {
            Conn::Redis(manager) => {
                let mut conn = manager.clone();
                Ok(conn.lpop(self.queue_key(), None).await?)
            }
            Conn::Memory(memory) => Ok(memory.lock().unwrap().queue.pop_front()),
        }
    }

    /// Remove every queued copy of `url`.
    pub async fn delete_job(&self, url: &str) -> Result<(), KvError> {
        match &self.conn {
            Conn::Redis(manager) => {
                let mut conn = manager.clone();
                let _: usize = conn.lrem(self.queue_key(), 0, url).await?;
            }
            Conn::Memory(memory) => {
                memory.lock().unwrap().queue.retain(|queued| queued != url);
            }
        }
        Ok(())
    }

    /// Report whether `url` was queued, removing every queued copy as a
    /// side effect. Callers that need the job to stay pending must re-enqueue
    /// after a `true`.
    pub async fn has_job(&self, url: &str) -> Result<bool, KvError> {
        match &self.conn {
            Conn::Redis(manager) => {
                let mut conn = manager.clone();
                let removed: usize = conn.lrem(self.queue_key(), 0, url).await?;
                Ok(removed > 0)
            }
            Conn::Memory(memory) => {
                let mut memory = memory.lock().unwrap();
                let before = memory.queue.len();
                memory.queue.retain(|queued| queued != url);
                Ok(memory.queue.len() < before)
            }
        }
    }

    /// Bind a filekey to its upstream URL.
    pub async fn put_filekey(&self, filekey: &str, url: &str) -> Result<(), KvError> {
        match &self.conn {
            Conn::Redis(manager) => {
                let mut conn = manager.clone();
                let _: () = conn.set(self.filekey_key(filekey), url).await?;
            }
            Conn::Memory(memory) => {
                memory
                    .lock()
                    .unwrap()
                    .strings
                    .insert(self.filekey_key(filekey), url.to_string());
            }
        }
        Ok(())
    }

    /// Bind many filekeys in one pipelined round-trip. Index pages routinely
    /// carry thousands of links; one SET per link would dominate the request.
    pub async fn bulk_put_filekeys(&self, entries: &[(String, String)]) -> Result<(), KvError> {
        if entries.is_empty() {
            return Ok(());
        }
        debug!(count = entries.len(), "registering filekey bindings");
        match &self.conn {
            Conn::Redis(manager) => {
                let mut conn = manager.clone();
                let mut pipe = redis::pipe();
                for (filekey, url) in entries {
                    pipe.set(self.filekey_key(filekey), url).ignore();
                }
                pipe.query_async::<()>(&mut conn).await?;
            }
            Conn::Memory(memory) => {
                let mut memory = memory.lock().unwrap();
                for (filekey, url) in entries {
                    memory
                        .strings
                        .insert(self.filekey_key(filekey), url.clone());
                }
            }
        }
        Ok(())
    }

    /// Resolve a filekey back to its upstream URL.
    pub async fn url_for_filekey(&self, filekey: &str) -> Result<Option<String>, KvError> {
        match &self.conn {
            Conn::Redis(manager) => {
                let mut conn = manager.clone();
                Ok(conn.get(self.filekey_key(filekey)).await?)
            }
            Conn::Memory(memory) => Ok(memory
                .lock()
                .unwrap()
                .strings
                .get(&self.filekey_key(filekey))
                .cloned()),
        }
    }
}

/// `:` is the key separator; user-supplied keys substitute `_`.
fn sanitize(key: &str) -> String {
    key.replace(':', "_")
}

#[derive(Debug, Error)]
pub enum KvError {
    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error("Invalid cache entry under `{key}`")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid timestamp under `{key}`")]
    Timestamp {
        key: String,
        #[source]
        source: jiff::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> KvStore {
        KvStore::in_memory("pakrat", RegistryKind::Pypi)
    }

    #[test]
    fn sanitize_substitutes_separator() {
        assert_eq!(sanitize("https://host/a:b"), "https_//host/a_b");
        assert_eq!(sanitize("plain"), "plain");
    }

    #[tokio::test]
    async fn cache_roundtrip() {
        let store = store();
        let entry = CacheEntry {
            status_code: 200,
            content: "body".to_string(),
            headers: vec![("content-type".to_string(), "text/html".to_string())],
        };

        assert!(store.get_cache("https://host/simple/a/").await.unwrap().is_none());
        store.set_cache("https://host/simple/a/", &entry).await.unwrap();

        let (timestamp, cached) = store
            .get_cache("https://host/simple/a/")
            .await
            .unwrap()
            .expect("entry was written");
        assert_eq!(cached, entry);
        assert!(timestamp <= Timestamp::now());
    }

    #[tokio::test]
    async fn filekey_directory_tolerates_separators() {
        let store = store();
        store
            .put_filekey("pkg-1.0.tar.gz", "https://host/pkg-1.0.tar.gz#sha256=ab:cd")
            .await
            .unwrap();
        assert_eq!(
            store.url_for_filekey("pkg-1.0.tar.gz").await.unwrap().as_deref(),
            Some("https://host/pkg-1.0.tar.gz#sha256=ab:cd"),
        );
        assert!(store.url_for_filekey("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bulk_put_is_readable_one_by_one() {
        let store = store();
        let entries = vec![
            ("a-1.0.tar.gz".to_string(), "https://host/a-1.0.tar.gz".to_string()),
            ("b-2.0.tar.gz".to_string(), "https://host/b-2.0.tar.gz".to_string()),
        ];
        store.bulk_put_filekeys(&entries).await.unwrap();
        for (filekey, url) in &entries {
            assert_eq!(store.url_for_filekey(filekey).await.unwrap().as_deref(), Some(url.as_str()));
        }
    }

    #[tokio::test]
    async fn queue_is_fifo() {
        let store = store();
        store.enqueue_job("https://host/a").await.unwrap();
        store.enqueue_job("https://host/b").await.unwrap();

        assert_eq!(store.dequeue_job().await.unwrap().as_deref(), Some("https://host/a"));
        assert_eq!(store.dequeue_job().await.unwrap().as_deref(), Some("https://host/b"));
        assert!(store.dequeue_job().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn has_job_removes_every_copy() {
        let store = store();
        store.enqueue_job("https://host/a").await.unwrap();
        store.enqueue_job("https://host/a").await.unwrap();
        store.enqueue_job("https://host/b").await.unwrap();

        assert!(store.has_job("https://host/a").await.unwrap());
        assert!(!store.has_job("https://host/a").await.unwrap());
        assert_eq!(store.dequeue_job().await.unwrap().as_deref(), Some("https://host/b"));
    }

    #[tokio::test]
    async fn delete_job_is_silent_on_absent() {
        let store = store();
        store.delete_job("https://host/a").await.unwrap();
        store.enqueue_job("https://host/a").await.unwrap();
        store.delete_job("https://host/a").await.unwrap();
        assert!(store.dequeue_job().await.unwrap().is_none());
    }
}
