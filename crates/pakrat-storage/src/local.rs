use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use pakrat_client::UpstreamClient;
use pakrat_filename::RegistryKind;

use crate::{storage_path, FileStore, Retrieved, StorageError};

/// Filesystem-backed storage under a configured base directory.
///
/// Writes go through a sidecar `<path>.lock` marker: the marker exists for
/// the whole write, and `check` treats the file as absent while it does, so
/// a partially downloaded file is never served.
pub struct LocalStore {
    kind: RegistryKind,
    client: UpstreamClient,
    root: PathBuf,
}

impl LocalStore {
    pub fn new(
        kind: RegistryKind,
        client: UpstreamClient,
        root: impl Into<PathBuf>,
    ) -> Result<Self, StorageError> {
        let root = root.into();
        fs_err::create_dir_all(&root)?;
        Ok(Self { kind, client, root })
    }

    fn absolute(&self, url: &str) -> Result<PathBuf, StorageError> {
        Ok(self.root.join(storage_path(self.kind, url)?))
    }
}

fn lock_marker(path: &Path) -> PathBuf {
    let mut marker = path.as_os_str().to_owned();
    marker.push(".lock");
    PathBuf::from(marker)
}

async fn exists(path: &Path) -> bool {
    fs_err::tokio::metadata(path).await.is_ok()
}

#[async_trait]
impl FileStore for LocalStore {
    fn build_path(&self, url: &str) -> Result<String, StorageError> {
        storage_path(self.kind, url)
    }

    async fn check(&self, url: &str) -> Result<bool, StorageError> {
        let path = self.absolute(url)?;
        let present = exists(&path).await && !exists(&lock_marker(&path)).await;
        debug!(path = %path.display(), present, "checked local file");
        Ok(present)
    }

    async fn save(&self, url: &str) -> Result<String, StorageError> {
        let path = self.absolute(url)?;
        if let Some(parent) = path.parent() {
            fs_err::tokio::create_dir_all(parent).await?;
        }

        let marker = lock_marker(&path);
        fs_err::tokio::write(&marker, b"").await?;

        info!(url, path = %path.display(), "downloading to local storage");
        let result = async {
            let mut stream = self.client.stream(url).await?;
            let mut file = fs_err::tokio::File::create(&path).await?;
            while let Some(chunk) = stream.next().await {
                file.write_all(&chunk?).await?;
            }
            file.flush().await?;
            Ok::<_, StorageError>(())
        }
        .await;

        // The marker comes off whether or not the write survived; a failed
        // write leaves a torn file that the next save overwrites.
        let _ = fs_err::tokio::remove_file(&marker).await;
        result?;

        Ok(path.display().to_string())
    }

    async fn retrieve(&self, url: &str) -> Result<Retrieved, StorageError> {
        let path = self.absolute(url)?;
        let length = fs_err::tokio::metadata(&path).await?.len();
        let file = fs_err::tokio::File::open(&path).await?;
        Ok(Retrieved::File { file, length })
    }

    async fn delete(&self, url: &str) -> Result<(), StorageError> {
        let path = self.absolute(url)?;
        debug!(path = %path.display(), "deleting local file");
        fs_err::tokio::remove_file(&path).await?;
        Ok(())
    }

    async fn stale(&self, max_age: Duration) -> Result<Vec<String>, StorageError> {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut pending = vec![self.root.clone()];
        let mut stale = Vec::new();

        while let Some(dir) = pending.pop() {
            let mut entries = fs_err::tokio::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let metadata = entry.metadata().await?;
                if metadata.is_dir() {
                    pending.push(path);
                    continue;
                }
                if path.extension().is_some_and(|ext| ext == "lock") {
                    continue;
                }
                if metadata.modified()? <= cutoff {
                    if let Ok(relative) = path.strip_prefix(&self.root) {
                        stale.push(relative.to_string_lossy().replace('\\', "/"));
                    }
                }
            }
        }
        Ok(stale)
    }

    async fn delete_path(&self, path: &str) -> Result<(), StorageError> {
        fs_err::tokio::remove_file(self.root.join(path)).await?;
        Ok(())
    }

    async fn healthcheck(&self) -> Result<(), StorageError> {
        fs_err::tokio::create_dir_all(&self.root).await?;
        Ok(())
    }
}
