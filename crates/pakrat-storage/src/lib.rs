pub use local::LocalStore;
pub use s3::{S3Options, S3Store};

mod local;
mod s3;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use pakrat_client::FetchError;
use pakrat_filename::{
    DistFilename, FilekeyError, FilenameError, NpmPathError, NpmTarballPath, PypiFilekey,
    RegistryKind,
};

/// Where a file's bytes live once materialized.
///
/// The same capability surface backs the local filesystem and S3; the file
/// service never branches on the variant. `save` tolerates concurrent
/// writers for the same URL: local via the sidecar lock marker, S3 via the
/// last-writer-wins single object put.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// The deterministic backend path for `url`, relative to the store root.
    fn build_path(&self, url: &str) -> Result<String, StorageError>;

    /// Whether the file is present and fully written.
    async fn check(&self, url: &str) -> Result<bool, StorageError>;

    /// Download `url` from the upstream into storage; returns a
    /// backend-specific locator.
    async fn save(&self, url: &str) -> Result<String, StorageError>;

    /// Serve a file that `check` reported present.
    async fn retrieve(&self, url: &str) -> Result<Retrieved, StorageError>;

    /// Remove the stored file for `url`.
    async fn delete(&self, url: &str) -> Result<(), StorageError>;

    /// Backend paths whose files are at least `max_age` old; input to the
    /// prune command.
    async fn stale(&self, max_age: Duration) -> Result<Vec<String>, StorageError>;

    /// Remove a file by a backend path previously reported by `stale`.
    async fn delete_path(&self, path: &str) -> Result<(), StorageError>;

    /// Startup reachability probe; the worker refuses to start when this
    /// fails.
    async fn healthcheck(&self) -> Result<(), StorageError>;
}

/// A materialized file, ready to serve.
#[derive(Debug)]
pub enum Retrieved {
    /// Stream the bytes directly (local backend).
    File {
        file: fs_err::tokio::File,
        length: u64,
    },
    /// Send the client elsewhere (object storage). `permanent` for public
    /// buckets whose canonical URLs never change.
    Redirect { url: String, permanent: bool },
}

/// The storage-relative path for `url`: `<name>/<version>/<filename>` in
/// PyPI mode (both wheel and sdist grammars), `<package>/<filename>` in npm
/// mode.
pub fn storage_path(kind: RegistryKind, url: &str) -> Result<String, StorageError> {
    match kind {
        RegistryKind::Pypi => {
            let filename = PypiFilekey::from_href(url)?;
            let filename = filename.key();
            let dist = DistFilename::parse(filename)?;
            Ok(format!("{}/{}/{}", dist.name(), dist.version(), filename))
        }
        RegistryKind::Npm => {
            let path = NpmTarballPath::from_url(url)?;
            Ok(format!("{}/{}", path.package, path.filename))
        }
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Filekey(#[from] FilekeyError),

    #[error(transparent)]
    Filename(#[from] FilenameError),

    #[error(transparent)]
    NpmPath(#[from] NpmPathError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A failure while draining the upstream byte stream.
    #[error(transparent)]
    Download(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Object store request failed")]
    S3(#[source] BoxError),
}

impl StorageError {
    pub(crate) fn s3(err: impl Into<BoxError>) -> Self {
        Self::S3(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pypi_paths_split_name_version_filename() {
        assert_eq!(
            storage_path(
                RegistryKind::Pypi,
                "https://files.pythonhosted.org/aa/requests-2.31.0.tar.gz#sha256=ff"
            )
            .unwrap(),
            "requests/2.31.0/requests-2.31.0.tar.gz",
        );
        assert_eq!(
            storage_path(
                RegistryKind::Pypi,
                "https://files.pythonhosted.org/bb/Jinja2-3.1.2-py3-none-any.whl"
            )
            .unwrap(),
            "jinja2/3.1.2/Jinja2-3.1.2-py3-none-any.whl",
        );
    }

    #[test]
    fn npm_paths_split_package_filename() {
        assert_eq!(
            storage_path(
                RegistryKind::Npm,
                "https://registry.npmjs.org/@types/node/-/node-20.8.0.tgz"
            )
            .unwrap(),
            "@types/node/node-20.8.0.tgz",
        );
    }

    #[test]
    fn unparsable_urls_are_errors() {
        assert!(storage_path(RegistryKind::Pypi, "https://host/not-a-dist.exe").is_err());
        assert!(storage_path(RegistryKind::Npm, "https://host/react/react-1.0.0.tgz").is_err());
    }
}
