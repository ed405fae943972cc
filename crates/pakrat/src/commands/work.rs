use anyhow::{Context, Result};

use pakrat_server::Worker;

use crate::commands::ExitStatus;
use crate::settings::Settings;

/// Run the download worker. The loop itself never gives up on job errors;
/// only an unreachable KV store or storage backend at startup is fatal.
pub(crate) async fn work(settings: Settings) -> Result<ExitStatus> {
    let kv = settings.kv_store().await?;
    let client = settings.upstream_client()?;
    let store = settings.file_store(client)?;

    let worker = Worker::new(kv, store);
    worker
        .startup_check()
        .await
        .context("worker startup check failed")?;

    worker.run().await;
    Ok(ExitStatus::Success)
}
