use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use bytes::BytesMut;
use futures::StreamExt;
use tracing::{debug, info};

use pakrat_client::UpstreamClient;
use pakrat_filename::RegistryKind;

use crate::{storage_path, FileStore, Retrieved, StorageError};

/// Connection parameters for an S3-compatible bucket.
#[derive(Debug, Clone)]
pub struct S3Options {
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    /// Custom endpoint for non-AWS stores (MinIO, R2); implies path-style
    /// addressing.
    pub endpoint_url: Option<String>,
    pub region: Option<String>,
    /// Key prefix inside the bucket.
    pub prefix: Option<String>,
    /// Public buckets get permanent redirects to the canonical object URL
    /// with the signature query stripped, which lets installers cache them.
    pub public: bool,
    /// Expiry for presigned URLs on private buckets.
    pub presign_ttl: Duration,
}

/// Object-store-backed storage. Saves are single object puts; the store's
/// last-writer-wins atomicity stands in for the local backend's lock marker.
pub struct S3Store {
    kind: RegistryKind,
    client: UpstreamClient,
    s3: aws_sdk_s3::Client,
    bucket: String,
    prefix: Option<String>,
    public: bool,
    presign_ttl: Duration,
}

impl S3Store {
    pub fn new(kind: RegistryKind, client: UpstreamClient, options: S3Options) -> Self {
        let mut config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(
                options.region.unwrap_or_else(|| "us-east-1".to_string()),
            ))
            .credentials_provider(Credentials::from_keys(
                options.access_key,
                options.secret_key,
                None,
            ));
        if let Some(endpoint) = options.endpoint_url {
            config = config.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            kind,
            client,
            s3: aws_sdk_s3::Client::from_conf(config.build()),
            bucket: options.bucket,
            prefix: options.prefix,
            public: options.public,
            presign_ttl: options.presign_ttl,
        }
    }

    fn object_key(&self, url: &str) -> Result<String, StorageError> {
        let path = storage_path(self.kind, url)?;
        Ok(match &self.prefix {
            Some(prefix) => format!("{}/{path}", prefix.trim_end_matches('/')),
            None => path,
        })
    }
}

/// Drop the signature query so installers can cache the canonical URL.
fn strip_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}

#[async_trait]
impl FileStore for S3Store {
    fn build_path(&self, url: &str) -> Result<String, StorageError> {
        self.object_key(url)
    }

    async fn check(&self, url: &str) -> Result<bool, StorageError> {
        let key = self.object_key(url)?;
        match self
            .s3
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(context)) if context.err().is_not_found() => {
                debug!(key = %key, "object not in bucket");
                Ok(false)
            }
            Err(err) => Err(StorageError::s3(err)),
        }
    }

    async fn save(&self, url: &str) -> Result<String, StorageError> {
        let key = self.object_key(url)?;
        info!(url, key = %key, "uploading to object storage");

        let mut stream = self.client.stream(url).await?;
        let mut body = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk?);
        }

        self.s3
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(body.freeze()))
            .send()
            .await
            .map_err(StorageError::s3)?;

        Ok(format!("s3://{}/{key}", self.bucket))
    }

    async fn retrieve(&self, url: &str) -> Result<Retrieved, StorageError> {
        let key = self.object_key(url)?;
        let presigning = PresigningConfig::expires_in(self.presign_ttl)
            .map_err(StorageError::s3)?;
        let presigned = self
            .s3
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .presigned(presigning)
            .await
            .map_err(StorageError::s3)?;

        let url = if self.public {
            strip_query(presigned.uri()).to_string()
        } else {
            presigned.uri().to_string()
        };
        debug!(key = %key, "redirecting to object storage");
        Ok(Retrieved::Redirect {
            url,
            permanent: self.public,
        })
    }

    async fn delete(&self, url: &str) -> Result<(), StorageError> {
        let key = self.object_key(url)?;
        debug!(key = %key, "deleting object");
        self.s3
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(StorageError::s3)?;
        Ok(())
    }

    async fn stale(&self, max_age: Duration) -> Result<Vec<String>, StorageError> {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(UNIX_EPOCH)
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs();
        let cutoff = i64::try_from(cutoff).unwrap_or(i64::MAX);

        let mut stale = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut request = self.s3.list_objects_v2().bucket(&self.bucket);
            if let Some(prefix) = &self.prefix {
                request = request.prefix(prefix.trim_end_matches('/'));
            }
            if let Some(token) = continuation.take() {
                request = request.continuation_token(token);
            }
            let page = request.send().await.map_err(StorageError::s3)?;

            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                let modified = object
                    .last_modified()
                    .map_or(0, aws_sdk_s3::primitives::DateTime::secs);
                if modified <= cutoff {
                    stale.push(key.to_string());
                }
            }

            match page.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }
        Ok(stale)
    }

    async fn delete_path(&self, path: &str) -> Result<(), StorageError> {
        self.s3
            .delete_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(StorageError::s3)?;
        Ok(())
    }

    async fn healthcheck(&self) -> Result<(), StorageError> {
        self.s3
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(StorageError::s3)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pakrat_client::UpstreamClientBuilder;

    fn store(prefix: Option<&str>, public: bool) -> S3Store {
        S3Store::new(
            RegistryKind::Pypi,
            UpstreamClientBuilder::new().retries(0).build().unwrap(),
            S3Options {
                bucket: "mirror".to_string(),
                access_key: "ak".to_string(),
                secret_key: "sk".to_string(),
                endpoint_url: Some("http://127.0.0.1:9000".to_string()),
                region: None,
                prefix: prefix.map(ToString::to_string),
                public,
                presign_ttl: Duration::from_secs(600),
            },
        )
    }

    #[test]
    fn object_keys_honor_the_prefix() {
        let url = "https://host/p/requests-2.31.0.tar.gz";
        assert_eq!(
            store(None, false).object_key(url).unwrap(),
            "requests/2.31.0/requests-2.31.0.tar.gz",
        );
        assert_eq!(
            store(Some("mirror/"), false).object_key(url).unwrap(),
            "mirror/requests/2.31.0/requests-2.31.0.tar.gz",
        );
    }

    #[test]
    fn queries_are_stripped_for_public_buckets() {
        assert_eq!(
            strip_query("https://bucket.s3.example/k/requests.tar.gz?X-Amz-Signature=abc"),
            "https://bucket.s3.example/k/requests.tar.gz",
        );
        assert_eq!(strip_query("https://bucket.s3.example/k"), "https://bucket.s3.example/k");
    }
}
