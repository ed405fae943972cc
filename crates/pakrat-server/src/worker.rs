use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info};

use pakrat_kv::{KvError, KvStore};
use pakrat_storage::{FileStore, StorageError};

/// The background materializer: drains the download queue into storage.
///
/// One or more worker processes may share the queue. There is no in-memory
/// coordination between them; `save` tolerates two workers racing on the
/// same URL, and a job record is removed after the attempt whether or not it
/// succeeded; a failed download is retried only when another miss re-queues
/// it.
pub struct Worker {
    kv: KvStore,
    store: Arc<dyn FileStore>,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerStartupError {
    #[error("key-value store is unreachable")]
    Kv(#[source] KvError),
    #[error("storage backend is unreachable")]
    Storage(#[source] StorageError),
}

impl Worker {
    pub fn new(kv: KvStore, store: Arc<dyn FileStore>) -> Self {
        Self { kv, store }
    }

    /// Verify both collaborators answer before entering the loop; a worker
    /// that cannot reach either is misdeployed and should exit nonzero.
    pub async fn startup_check(&self) -> Result<(), WorkerStartupError> {
        self.kv.ping().await.map_err(WorkerStartupError::Kv)?;
        self.store
            .healthcheck()
            .await
            .map_err(WorkerStartupError::Storage)?;
        Ok(())
    }

    /// Process jobs forever, sleeping while the queue is idle.
    pub async fn run(&self) {
        info!("worker started");
        loop {
            if !self.run_once().await {
                sleep(Duration::from_secs(1)).await;
            }
        }
    }

    /// One iteration: returns whether a job was dequeued. Job failures are
    /// logged and never fatal.
    pub async fn run_once(&self) -> bool {
        let url = match self.kv.dequeue_job().await {
            Ok(Some(url)) => url,
            Ok(None) => return false,
            Err(err) => {
                error!(error = %err, "failed to poll the download queue");
                return false;
            }
        };

        match self.store.save(&url).await {
            Ok(location) => info!(url = %url, location = %location, "materialized file"),
            Err(err) => error!(url = %url, error = %err, "failed to materialize file"),
        }
        if let Err(err) = self.kv.delete_job(&url).await {
            error!(url = %url, error = %err, "failed to drop the job record");
        }
        true
    }
}
