use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::Response;
use tracing::debug;
use url::Url;

use pakrat_kv::CacheEntry;
use pakrat_rewriter::{rewrite_pypi_json, rewrite_simple_html, RewriteError, Rewritten};

use crate::response::{entry_response, rewritten_response};
use crate::{AppState, ServerError};

/// `GET /simple/{project}/`: the rewritten simple index.
pub(crate) async fn simple_index(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
) -> Result<Response, ServerError> {
    match fetch_rewritten_index(&state, &project).await? {
        (entry, Some(rewritten)) => Ok(rewritten_response(entry, rewritten.payload.clone())),
        // Non-200 upstream answers pass through untouched.
        (entry, None) => Ok(entry_response(entry)),
    }
}

/// `GET /pypi/{project}/json`.
pub(crate) async fn project_json(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
) -> Result<Response, ServerError> {
    rewritten_json(&state, &format!("pypi/{project}/json")).await
}

/// `GET /pypi/{project}/{version}/json`.
pub(crate) async fn project_version_json(
    State(state): State<Arc<AppState>>,
    Path((project, version)): Path<(String, String)>,
) -> Result<Response, ServerError> {
    rewritten_json(&state, &format!("pypi/{project}/{version}/json")).await
}

async fn rewritten_json(state: &AppState, path: &str) -> Result<Response, ServerError> {
    let url = state.upstream_url(path);
    let entry = state.cache.get(&url).await?;
    if !entry.is_ok() {
        return Ok(entry_response(entry));
    }

    let rewritten = state
        .rewrite_cached(&entry.content, |payload| {
            rewrite_pypi_json(payload, &state.config.public_url)
        })
        .await?;
    Ok(rewritten_response(entry, rewritten.payload.clone()))
}

/// Fetch a project's simple index and, when the upstream answered 200,
/// rewrite it and register its filekey bindings.
pub(crate) async fn fetch_rewritten_index(
    state: &AppState,
    project: &str,
) -> Result<(CacheEntry, Option<Arc<Rewritten>>), ServerError> {
    let url = state.upstream_url(&format!("simple/{project}/"));
    let entry = state.cache.get(&url).await?;
    if !entry.is_ok() {
        debug!(project, status = entry.status_code, "passing through index answer");
        return Ok((entry, None));
    }

    let page_url =
        Url::parse(&url).map_err(|err| RewriteError::UrlParse(url.clone(), err))?;
    let rewritten = state
        .rewrite_cached(&entry.content, |payload| {
            rewrite_simple_html(payload, &page_url, &state.config.public_url)
        })
        .await?;
    Ok((entry, Some(rewritten)))
}
