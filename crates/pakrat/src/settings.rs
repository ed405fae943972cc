use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;

use pakrat_client::{UpstreamClient, UpstreamClientBuilder};
use pakrat_filename::RegistryKind;
use pakrat_kv::KvStore;
use pakrat_server::ProxyConfig;
use pakrat_storage::{FileStore, LocalStore, S3Options, S3Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StorageDriver {
    Local,
    S3,
}

impl FromStr for StorageDriver {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "s3" => Ok(Self::S3),
            other => Err(format!("unknown storage driver: {other}")),
        }
    }
}

/// All runtime configuration, environment-driven with flag overrides.
/// Constructed once at startup and passed down by parameter; nothing reads
/// the environment after this point.
#[derive(Args, Debug, Clone)]
pub(crate) struct Settings {
    /// Registry flavor to mirror: `pypi` or `npm`.
    #[arg(long, env = "PACKAGE_TYPE", default_value = "pypi", value_parser = RegistryKind::from_str)]
    package_type: RegistryKind,

    /// Address the server listens on.
    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0:8080")]
    bind_address: SocketAddr,

    /// Externally visible base URL, used in rewritten links.
    #[arg(long, env = "PUBLIC_URL", default_value = "http://127.0.0.1:8080")]
    public_url: String,

    /// Base URL of the upstream registry. Required by `serve`.
    #[arg(long, env = "UPSTREAM_URL")]
    upstream_url: Option<String>,

    /// Refuse file misses with 503 instead of redirecting to the upstream.
    #[arg(long, env = "UPSTREAM_STRICT", default_value_t = false, action = clap::ArgAction::Set)]
    upstream_strict: bool,

    /// Basic-auth username for upstream fetches.
    #[arg(long, env = "UPSTREAM_USERNAME")]
    upstream_username: Option<String>,

    /// Basic-auth password for upstream fetches.
    #[arg(long, env = "UPSTREAM_PASSWORD", hide_env_values = true)]
    upstream_password: Option<String>,

    /// Storage backend: `local` or `s3`.
    #[arg(long, env = "FILE_STORAGE_DRIVER", default_value = "local", value_parser = StorageDriver::from_str)]
    file_storage_driver: StorageDriver,

    /// Base directory for local storage.
    #[arg(long, env = "FILE_STORAGE_DIRECTORY", default_value = "./package-files")]
    file_storage_directory: PathBuf,

    #[arg(long, env = "S3_BUCKET")]
    s3_bucket: Option<String>,

    #[arg(long, env = "S3_ACCESS_KEY", hide_env_values = true)]
    s3_access_key: Option<String>,

    #[arg(long, env = "S3_SECRET_KEY", hide_env_values = true)]
    s3_secret_key: Option<String>,

    /// Custom S3 endpoint for non-AWS object stores.
    #[arg(long, env = "S3_ENDPOINT_URL")]
    s3_endpoint_url: Option<String>,

    #[arg(long, env = "S3_REGION")]
    s3_region: Option<String>,

    /// Key prefix inside the bucket.
    #[arg(long, env = "S3_PREFIX")]
    s3_prefix: Option<String>,

    /// The bucket is world-readable: redirect permanently to canonical
    /// object URLs with the signature query stripped.
    #[arg(long, env = "S3_PUBLIC", default_value_t = false, action = clap::ArgAction::Set)]
    s3_public: bool,

    /// Expiry in seconds for presigned URLs on private buckets.
    #[arg(long, env = "S3_KEY_TTL", default_value_t = 600)]
    s3_key_ttl: u64,

    /// Key-value store endpoint; `memory://` keeps everything in-process.
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    /// Namespace prefix for every key.
    #[arg(long, env = "REDIS_PREFIX", default_value = "pakrat")]
    redis_prefix: String,

    /// Metadata cache TTL in seconds.
    #[arg(long, env = "CACHE_TIME", default_value_t = 1800)]
    cache_time: u64,
}

impl Settings {
    pub(crate) fn bind_address(&self) -> SocketAddr {
        self.bind_address
    }

    pub(crate) fn proxy_config(&self) -> Result<ProxyConfig> {
        let Some(upstream_url) = &self.upstream_url else {
            bail!("UPSTREAM_URL must be set");
        };
        Ok(ProxyConfig {
            kind: self.package_type,
            upstream_url: upstream_url.trim_end_matches('/').to_string(),
            public_url: self.public_url.trim_end_matches('/').to_string(),
            strict: self.upstream_strict,
            cache_ttl_seconds: self.cache_time,
        })
    }

    pub(crate) async fn kv_store(&self) -> Result<KvStore> {
        KvStore::open(&self.redis_url, &self.redis_prefix, self.package_type)
            .await
            .context("failed to connect to the key-value store")
    }

    pub(crate) fn upstream_client(&self) -> Result<UpstreamClient> {
        UpstreamClientBuilder::new()
            .credentials(
                self.upstream_username.clone(),
                self.upstream_password.clone(),
            )
            .build()
            .context("failed to construct the upstream HTTP client")
    }

    pub(crate) fn file_store(&self, client: UpstreamClient) -> Result<Arc<dyn FileStore>> {
        match self.file_storage_driver {
            StorageDriver::Local => {
                let store = LocalStore::new(
                    self.package_type,
                    client,
                    &self.file_storage_directory,
                )
                .with_context(|| {
                    format!(
                        "failed to prepare storage directory {}",
                        self.file_storage_directory.display()
                    )
                })?;
                Ok(Arc::new(store))
            }
            StorageDriver::S3 => {
                let (Some(bucket), Some(access_key), Some(secret_key)) = (
                    self.s3_bucket.clone(),
                    self.s3_access_key.clone(),
                    self.s3_secret_key.clone(),
                ) else {
                    bail!("the s3 storage driver requires S3_BUCKET, S3_ACCESS_KEY and S3_SECRET_KEY");
                };
                Ok(Arc::new(S3Store::new(
                    self.package_type,
                    client,
                    S3Options {
                        bucket,
                        access_key,
                        secret_key,
                        endpoint_url: self.s3_endpoint_url.clone(),
                        region: self.s3_region.clone(),
                        prefix: self.s3_prefix.clone(),
                        public: self.s3_public,
                        presign_ttl: Duration::from_secs(self.s3_key_ttl),
                    },
                )))
            }
        }
    }
}
