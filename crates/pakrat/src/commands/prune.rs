use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use crate::commands::ExitStatus;
use crate::settings::Settings;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Delete stored files older than `days`. Storage is taken by parameter
/// from the settings, like every other collaborator; the server does not
/// need to be running.
pub(crate) async fn prune(settings: Settings, days: u64, dry_run: bool) -> Result<ExitStatus> {
    let client = settings.upstream_client()?;
    let store = settings.file_store(client)?;

    let stale = store
        .stale(Duration::from_secs(days.saturating_mul(SECONDS_PER_DAY)))
        .await?;

    if dry_run {
        for path in &stale {
            info!(path = %path, "would delete");
        }
        println!("{} files would have been deleted", stale.len());
        return Ok(ExitStatus::Success);
    }

    let mut deleted = 0usize;
    for path in &stale {
        match store.delete_path(path).await {
            Ok(()) => deleted += 1,
            Err(err) => warn!(path = %path, error = %err, "failed to delete"),
        }
    }
    println!("{deleted} files were deleted");
    Ok(ExitStatus::Success)
}
