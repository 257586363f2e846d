//! Local filesystem backend.
//!
//! Listing is resilient: entries that disappear (or become unreadable)
//! between enumeration and attribute-read are skipped with a log line
//! rather than aborting the whole listing.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{CoreError, CoreResult};
use crate::model::{Host, Resource};
use crate::repo::{ensure_directory, path as rpath, rank_matches, ProgressFn, ResourceRepository};

/// Copy buffer for streamed downloads.
const DOWNLOAD_BUF_SIZE: usize = 8 * 1024;

/// Repository over the local filesystem, rooted at the host's root path.
pub struct LocalRepository {
    host: Host,
    downloads_dir: PathBuf,
}

impl LocalRepository {
    pub fn new(host: Host) -> Self {
        Self {
            host,
            downloads_dir: PathBuf::from("downloads"),
        }
    }

    /// Overrides the download staging directory (default `downloads/`).
    pub fn with_downloads_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.downloads_dir = dir.into();
        self
    }

    async fn resource_from_path(&self, path: &Path) -> CoreResult<Resource> {
        let meta = tokio::fs::metadata(path).await.map_err(|e| {
            CoreError::repository(format!("reading attributes of '{}'", path.display()), e)
        })?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());

        let mime = if meta.is_dir() {
            "inode/directory".to_string()
        } else {
            mime_guess::from_path(path)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        };

        Ok(Resource::new(
            path.to_string_lossy().into_owned(),
            name,
            mime,
            meta.len() as i64,
            meta.created().ok(),
            meta.modified().ok(),
            meta.is_dir(),
            self.host.id().clone(),
        ))
    }
}

#[async_trait]
impl ResourceRepository for LocalRepository {
    async fn connect(&self) -> CoreResult<()> {
        Ok(())
    }

    async fn list(&self, path: &str, depth: u32) -> CoreResult<Vec<Resource>> {
        let fs_path = Path::new(path);
        if depth == 0 {
            return Ok(vec![self.resource_from_path(fs_path).await?]);
        }

        let mut read_dir = tokio::fs::read_dir(fs_path)
            .await
            .map_err(|e| CoreError::repository(format!("listing '{path}' failed"), e))?;

        let mut resources = Vec::new();
        loop {
            let entry = match read_dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    return Err(CoreError::repository(format!("listing '{path}' failed"), e))
                }
            };
            match self.resource_from_path(&entry.path()).await {
                Ok(res) => resources.push(res),
                // The entry may have vanished between enumeration and
                // attribute-read; skip it, keep the rest of the listing.
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "skipping entry")
                }
            }
        }
        Ok(resources)
    }

    async fn get_content(&self, res: &Resource) -> CoreResult<Vec<u8>> {
        tokio::fs::read(res.path())
            .await
            .map_err(|e| CoreError::repository(format!("reading '{}' failed", res.path()), e))
    }

    async fn download(&self, res: &Resource, mut on_progress: ProgressFn) -> CoreResult<PathBuf> {
        tokio::fs::create_dir_all(&self.downloads_dir).await?;
        let target = self.downloads_dir.join(res.name());

        let mut src = tokio::fs::File::open(res.path())
            .await
            .map_err(|e| CoreError::repository(format!("opening '{}' failed", res.path()), e))?;
        let mut dest = tokio::fs::File::create(&target).await?;

        let mut buf = vec![0u8; DOWNLOAD_BUF_SIZE];
        loop {
            let n = src.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            dest.write_all(&buf[..n]).await?;
            on_progress(n as u64);
        }
        dest.flush().await?;
        Ok(target)
    }

    async fn upload(&self, parent: &Resource, local_file: &Path) -> CoreResult<String> {
        ensure_directory(parent)?;
        let name = local_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                CoreError::Validation(format!("'{}' has no file name", local_file.display()))
            })?;
        let dest = rpath::join_path(parent.path(), &name);

        if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
            return Err(CoreError::repository_msg(format!(
                "'{dest}' already exists"
            )));
        }
        tokio::fs::copy(local_file, &dest).await.map_err(|e| {
            CoreError::repository(
                format!("copying '{}' to '{dest}' failed", local_file.display()),
                e,
            )
        })?;
        Ok(dest)
    }

    async fn delete(&self, res: &Resource) -> CoreResult<()> {
        let result = if res.is_directory() {
            tokio::fs::remove_dir(res.path()).await
        } else {
            tokio::fs::remove_file(res.path()).await
        };
        result.map_err(|e| CoreError::repository(format!("deleting '{}' failed", res.path()), e))
    }

    async fn move_to(&self, src: &Resource, dest_dir: &Resource) -> CoreResult<()> {
        ensure_directory(dest_dir)?;
        let dest = rpath::join_path(dest_dir.path(), src.name());
        tokio::fs::rename(src.path(), &dest).await.map_err(|e| {
            CoreError::repository(
                format!("moving '{}' to '{dest}' failed", src.path()),
                e,
            )
        })
    }

    async fn create_directory(&self, parent: &Resource, name: &str) -> CoreResult<String> {
        ensure_directory(parent)?;
        let dir = rpath::join_path(parent.path(), name);
        tokio::fs::create_dir(&dir)
            .await
            .map_err(|e| CoreError::repository(format!("creating '{dir}' failed"), e))?;
        Ok(dir)
    }

    async fn search(&self, parent: &Resource, query: &str) -> CoreResult<Vec<Resource>> {
        ensure_directory(parent)?;

        let mut found = Vec::new();
        let mut pending = vec![PathBuf::from(parent.path())];
        while let Some(dir) = pending.pop() {
            let mut read_dir = match tokio::fs::read_dir(&dir).await {
                Ok(rd) => rd,
                Err(e) => {
                    tracing::warn!(path = %dir.display(), error = %e, "skipping unreadable directory");
                    continue;
                }
            };
            while let Ok(Some(entry)) = read_dir.next_entry().await {
                match self.resource_from_path(&entry.path()).await {
                    Ok(res) => {
                        if res.is_directory() {
                            pending.push(entry.path());
                        }
                        found.push(res);
                    }
                    Err(e) => {
                        tracing::warn!(path = %entry.path().display(), error = %e, "skipping entry")
                    }
                }
            }
        }
        Ok(rank_matches(found, query))
    }

    async fn disconnect(&self) -> CoreResult<()> {
        Ok(())
    }

    fn host(&self) -> &Host {
        &self.host
    }
}
