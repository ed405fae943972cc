pub use cache::MetadataCache;
pub use client::{UpstreamClient, UpstreamClientBuilder};
pub use error::FetchError;

mod cache;
mod client;
mod error;
