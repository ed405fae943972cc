use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::response::Response;
use http::StatusCode;
use tracing::{debug, info};

use pakrat_filename::{normalize_filekey, DistFilename, NpmTarballPath};

use crate::response::{redirect, retrieved_response};
use crate::{pypi, AppState, ServerError};

/// `GET /file/{filekey}` in PyPI mode.
pub(crate) async fn pypi_file(
    State(state): State<Arc<AppState>>,
    Path(filekey): Path<String>,
) -> Result<Response, ServerError> {
    // Installers hold the fragment client-side, but a literal-minded client
    // may have percent-encoded it into the path; either way the directory is
    // keyed by the bare filename.
    let key = normalize_filekey(&filekey);
    let url = match state.kv.url_for_filekey(key).await? {
        Some(url) => url,
        None => recover_pypi_binding(&state, key).await?,
    };
    serve_file_url(&state, &url).await
}

/// The directory can miss a key that a client legitimately holds, such as a
/// cached link from before the KV store was rebuilt. The bindings all come from the
/// project's index page, so refreshing it reseeds the directory; one retry,
/// then 404.
async fn recover_pypi_binding(state: &AppState, key: &str) -> Result<String, ServerError> {
    let Ok(dist) = DistFilename::parse(key) else {
        return Err(ServerError::UnknownFilekey(key.to_string()));
    };
    debug!(key, project = dist.name(), "unknown file key, refreshing project index");
    pypi::fetch_rewritten_index(state, dist.name()).await?;

    state
        .kv
        .url_for_filekey(key)
        .await?
        .ok_or_else(|| ServerError::UnknownFilekey(key.to_string()))
}

/// A tarball request in npm mode. npm filekeys are full registry paths and
/// there is no project page derivable from the path alone, so an unknown key
/// is a client error.
pub(crate) async fn npm_file(
    state: &AppState,
    tarball: &NpmTarballPath,
) -> Result<Response, ServerError> {
    let key = tarball.key();
    let url = state
        .kv
        .url_for_filekey(&key)
        .await?
        .ok_or(ServerError::InvalidFilePath(key))?;
    serve_file_url(state, &url).await
}

/// Serve a resolved upstream URL: from storage when materialized, otherwise
/// queue a download and either refuse (strict) or hand the client the
/// upstream URL (permissive).
pub(crate) async fn serve_file_url(state: &AppState, url: &str) -> Result<Response, ServerError> {
    if state.store.check(url).await? {
        debug!(url, "serving from storage");
        return Ok(retrieved_response(state.store.retrieve(url).await?));
    }

    // `has_job` drains any queued copies as it probes, so the enqueue that
    // follows leaves exactly one pending job per miss.
    let was_pending = state.kv.has_job(url).await?;
    state.kv.enqueue_job(url).await?;
    info!(url, was_pending, "file not materialized, queued download");

    if state.config.strict {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
        Ok(response)
    } else {
        Ok(redirect(StatusCode::FOUND, url))
    }
}
