pub use html::rewrite_simple_html;
pub use json::rewrite_pypi_json;
pub use npm::rewrite_npm_json;

mod html;
mod json;
mod npm;

use thiserror::Error;

/// The result of a rewriting pass: the payload with every file-download URL
/// replaced by a proxy link, plus the `(filekey, upstream URL)` bindings the
/// pass discovered.
///
/// The rewriter never touches the KV store itself; the caller registers the
/// bindings in one pipelined write and serves the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewritten {
    pub payload: String,
    pub bindings: Vec<(String, String)>,
}

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error(transparent)]
    HtmlParse(#[from] tl::ParseError),

    #[error("Missing href attribute on anchor link")]
    MissingHref,

    #[error(transparent)]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Failed to parse URL: {0}")]
    UrlParse(String, #[source] url::ParseError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Filekey(#[from] pakrat_filename::FilekeyError),

    #[error(transparent)]
    NpmPath(#[from] pakrat_filename::NpmPathError),

    #[error("Expected `{0}` to hold a string URL")]
    MalformedManifest(&'static str),
}
