use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    /// A transport-level failure (connect, timeout, TLS) or an exhausted
    /// retry budget. Refer to the error message for details.
    #[error(transparent)]
    RequestMiddlewareError(#[from] reqwest_middleware::Error),

    /// A request-level failure surfaced by the underlying client.
    #[error(transparent)]
    RequestError(#[from] reqwest::Error),

    /// The upstream answered with a server error; the response is not
    /// cacheable.
    #[error("Upstream returned status {1} for {0}")]
    UpstreamStatus(String, u16),
}
