use axum::body::Body;
use axum::response::Response;
use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use http::StatusCode;
use tokio_util::io::ReaderStream;
use tracing::warn;

use pakrat_kv::CacheEntry;
use pakrat_storage::Retrieved;

/// Render a cache entry as a response. The entry's headers were filtered at
/// fetch time; `content-length` is recomputed here from the (possibly
/// rewritten) body.
pub(crate) fn entry_response(entry: CacheEntry) -> Response {
    let mut response = Response::new(Body::from(entry.content));
    *response.status_mut() =
        StatusCode::from_u16(entry.status_code).unwrap_or(StatusCode::BAD_GATEWAY);
    for (name, value) in entry.headers {
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) else {
            warn!(name = %name, "dropping unrepresentable cached header");
            continue;
        };
        response.headers_mut().append(name, value);
    }
    response
}

/// Render a cache entry with its body swapped for a rewritten payload.
pub(crate) fn rewritten_response(entry: CacheEntry, payload: String) -> Response {
    entry_response(CacheEntry {
        status_code: entry.status_code,
        content: payload,
        headers: entry.headers,
    })
}

/// A bare redirect. Misses use `302 Found` so installers retry the proxy
/// next time; public object URLs use `301` and may be cached.
pub(crate) fn redirect(status: StatusCode, location: &str) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    match HeaderValue::from_str(location) {
        Ok(value) => {
            response.headers_mut().insert(LOCATION, value);
        }
        Err(_) => {
            warn!(location, "redirect target is not a legal header value");
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        }
    }
    response
}

/// Render a materialized file: a byte stream for local storage, a redirect
/// for object storage.
pub(crate) fn retrieved_response(retrieved: Retrieved) -> Response {
    match retrieved {
        Retrieved::File { file, length } => {
            let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
            response
                .headers_mut()
                .insert(CONTENT_LENGTH, HeaderValue::from(length));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            );
            response
        }
        Retrieved::Redirect { url, permanent } => {
            let status = if permanent {
                StatusCode::MOVED_PERMANENTLY
            } else {
                StatusCode::FOUND
            };
            redirect(status, &url)
        }
    }
}
