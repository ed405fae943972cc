use std::sync::Arc;

use axum::extract::State;
use axum::response::Response;
use http::Uri;
use percent_encoding::percent_decode_str;
use tracing::debug;

use pakrat_filename::NpmTarballPath;
use pakrat_rewriter::rewrite_npm_json;

use crate::response::{entry_response, rewritten_response};
use crate::{files, AppState, ServerError};

/// `GET /-/npm/v1/keys`: served from the metadata cache, no rewriting.
pub(crate) async fn keys(State(state): State<Arc<AppState>>) -> Result<Response, ServerError> {
    let entry = state.cache.get(&state.upstream_url("-/npm/v1/keys")).await?;
    Ok(entry_response(entry))
}

/// Everything else in npm mode: `<package>/-/<filename>` paths are file
/// requests, the rest are package documents. Package names may be scoped
/// (`@scope/name`, sometimes with an encoded slash), so the split happens on
/// the decoded path rather than on route segments.
pub(crate) async fn dispatch(
    State(state): State<Arc<AppState>>,
    uri: Uri,
) -> Result<Response, ServerError> {
    let path = percent_decode_str(uri.path()).decode_utf8_lossy();
    let path = path.trim_matches('/');
    if path.is_empty() {
        return Err(ServerError::NotFound);
    }

    if let Ok(tarball) = NpmTarballPath::from_path(path) {
        debug!(%tarball, "npm file request");
        return files::npm_file(&state, &tarball).await;
    }
    package_document(&state, path).await
}

async fn package_document(state: &AppState, path: &str) -> Result<Response, ServerError> {
    let url = state.upstream_url(path);
    let entry = state.cache.get(&url).await?;
    if !entry.is_ok() {
        return Ok(entry_response(entry));
    }

    let rewritten = state
        .rewrite_cached(&entry.content, |payload| {
            rewrite_npm_json(payload, &state.config.public_url)
        })
        .await?;
    Ok(rewritten_response(entry, rewritten.payload.clone()))
}
