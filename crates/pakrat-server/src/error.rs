use axum::response::{IntoResponse, Response};
use http::StatusCode;
use thiserror::Error;
use tracing::error;

use pakrat_kv::KvError;
use pakrat_rewriter::RewriteError;
use pakrat_storage::StorageError;

/// Every user-facing failure becomes an HTTP status; nothing here aborts the
/// process.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The KV substrate is unreachable or returned garbage.
    #[error(transparent)]
    Kv(#[from] KvError),

    /// Storage could not be read or written.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The upstream served a payload the rewriter cannot parse.
    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    /// A file route named a key the directory has never seen.
    #[error("Unknown file key `{0}`")]
    UnknownFilekey(String),

    /// A file route path that cannot name a file at all.
    #[error("Invalid file path `{0}`")]
    InvalidFilePath(String),

    #[error("Not found")]
    NotFound,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Kv(_) | Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Rewrite(_) => StatusCode::BAD_GATEWAY,
            Self::UnknownFilekey(_) | Self::NotFound => StatusCode::NOT_FOUND,
            Self::InvalidFilePath(_) => StatusCode::BAD_REQUEST,
        };
        if status.is_server_error() {
            error!(error = ?self, "request failed");
        }
        (status, self.to_string()).into_response()
    }
}
