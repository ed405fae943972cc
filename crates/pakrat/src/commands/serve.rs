use anyhow::{Context, Result};
use tracing::info;

use pakrat_server::AppState;

use crate::commands::ExitStatus;
use crate::settings::Settings;

/// Run the caching proxy until interrupted.
pub(crate) async fn serve(settings: Settings) -> Result<ExitStatus> {
    let config = settings.proxy_config()?;
    info!(
        kind = %config.kind,
        upstream = %config.upstream_url,
        strict = config.strict,
        "starting proxy"
    );

    let kv = settings.kv_store().await?;
    let client = settings.upstream_client()?;
    let store = settings.file_store(client.clone())?;

    let state = AppState::new(config, kv, client, store);
    pakrat_server::serve(state, settings.bind_address())
        .await
        .context("server terminated abnormally")?;

    Ok(ExitStatus::Success)
}
