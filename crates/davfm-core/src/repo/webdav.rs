//! WebDAV backend.
//!
//! Built on an `opendal` operator configured for the host's base URI. The
//! operator percent-encodes path segments before joining them into request
//! URIs, so all paths on this side of the seam stay decoded. PROPFIND-style
//! listings echo the queried collection back as an entry; [`is_echo_of`]
//! filters it out to uphold the parent-exclusion contract.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use futures::TryStreamExt;
use opendal::{services::Webdav, Metakey, Operator};
use tokio::io::AsyncWriteExt;

use crate::error::{CoreError, CoreResult};
use crate::model::{Host, Resource};
use crate::repo::{ensure_directory, path as rpath, rank_matches, ProgressFn, ResourceRepository};

/// Ranged-read chunk size for streamed downloads.
const DOWNLOAD_CHUNK: u64 = 256 * 1024;

/// Repository over a remote WebDAV server.
pub struct WebDavRepository {
    host: Host,
    op: Operator,
    downloads_dir: PathBuf,
}

impl WebDavRepository {
    /// Builds the operator for `host`. No request is made until
    /// [`ResourceRepository::connect`] probes the server.
    pub fn new(host: Host) -> CoreResult<Self> {
        let mut builder = Webdav::default().endpoint(host.base_uri());
        if let Some(user) = host.user() {
            builder = builder.username(user);
        }
        if let Some(password) = host.password() {
            builder = builder.password(password);
        }
        let op = Operator::new(builder)
            .map_err(|e| CoreError::Connect(e.to_string()))?
            .finish();
        Ok(Self {
            host,
            op,
            downloads_dir: PathBuf::from("downloads"),
        })
    }

    /// Overrides the download staging directory (default `downloads/`).
    pub fn with_downloads_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.downloads_dir = dir.into();
        self
    }

    /// The externally usable URI of a resource, with every path segment
    /// percent-encoded. Handed to media players and drag-out consumers.
    pub fn url_for(&self, res: &Resource) -> String {
        format!(
            "{}{}",
            self.host.base_uri().trim_end_matches('/'),
            rpath::encode_path(res.path())
        )
    }

    fn resource_from_parts(
        &self,
        rel_path: &str,
        meta: &opendal::Metadata,
    ) -> Resource {
        let directory = meta.is_dir();
        let abs = abs_of(rel_path);
        let name = rpath::file_name(&abs).to_string();
        let mime = meta
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| {
                if directory {
                    "httpd/unix-directory".to_string()
                } else {
                    mime_guess::from_path(&name)
                        .first_or_octet_stream()
                        .essence_str()
                        .to_string()
                }
            });
        Resource::new(
            abs,
            name,
            mime,
            meta.content_length() as i64,
            None,
            meta.last_modified().map(SystemTime::from),
            directory,
            self.host.id().clone(),
        )
    }
}

/// Converts an absolute decoded path to the operator-relative form.
fn rel_of(path: &str) -> String {
    path.trim_start_matches('/').to_string()
}

/// Operator-relative directory path, always `/`-terminated (the empty
/// string denotes the server root).
fn dir_rel_of(path: &str) -> String {
    let rel = rel_of(path);
    if rel.is_empty() || rel.ends_with('/') {
        rel
    } else {
        format!("{rel}/")
    }
}

/// Converts an operator-relative path back to the absolute form.
fn abs_of(rel: &str) -> String {
    format!("/{}", rel.trim_start_matches('/').trim_end_matches('/'))
}

/// `true` when a listed entry is the queried collection itself, echoed
/// back by the protocol.
fn is_echo_of(query_rel: &str, entry_rel: &str) -> bool {
    query_rel.trim_matches('/') == entry_rel.trim_matches('/')
}

#[async_trait]
impl ResourceRepository for WebDavRepository {
    async fn connect(&self) -> CoreResult<()> {
        self.op
            .check()
            .await
            .map_err(|e| CoreError::Connect(e.to_string()))
    }

    async fn list(&self, path: &str, depth: u32) -> CoreResult<Vec<Resource>> {
        if depth == 0 {
            let rel = rel_of(path);
            let meta = self
                .op
                .stat(&rel)
                .await
                .map_err(|e| CoreError::repository(format!("stat of '{path}' failed"), e))?;
            return Ok(vec![self.resource_from_parts(&rel, &meta)]);
        }

        let query_rel = dir_rel_of(path);
        let mut lister = self
            .op
            .lister_with(&query_rel)
            .metakey(Metakey::ContentLength | Metakey::LastModified | Metakey::Mode)
            .await
            .map_err(|e| CoreError::repository(format!("listing '{path}' failed"), e))?;

        let mut resources = Vec::new();
        while let Some(entry) = lister
            .try_next()
            .await
            .map_err(|e| CoreError::repository(format!("listing '{path}' failed"), e))?
        {
            // Filter out the queried collection, echoed with its children.
            if entry.path().is_empty() || is_echo_of(&query_rel, entry.path()) {
                continue;
            }
            resources.push(self.resource_from_parts(entry.path(), entry.metadata()));
        }
        Ok(resources)
    }

    async fn get_content(&self, res: &Resource) -> CoreResult<Vec<u8>> {
        self.op
            .read(&rel_of(res.path()))
            .await
            .map(|buf| buf.to_vec())
            .map_err(|e| {
                CoreError::repository(format!("fetching '{}' from server failed", res.path()), e)
            })
    }

    async fn download(&self, res: &Resource, mut on_progress: ProgressFn) -> CoreResult<PathBuf> {
        tokio::fs::create_dir_all(&self.downloads_dir).await?;
        let target = self.downloads_dir.join(res.name());
        let mut dest = tokio::fs::File::create(&target).await?;

        let rel = rel_of(res.path());
        let size = self
            .op
            .stat(&rel)
            .await
            .map_err(|e| CoreError::repository(format!("stat of '{}' failed", res.path()), e))?
            .content_length();

        let mut offset = 0u64;
        while offset < size {
            let end = (offset + DOWNLOAD_CHUNK).min(size);
            let chunk = self
                .op
                .read_with(&rel)
                .range(offset..end)
                .await
                .map_err(|e| {
                    CoreError::repository(format!("downloading '{}' failed", res.path()), e)
                })?
                .to_vec();
            if chunk.is_empty() {
                return Err(CoreError::repository_msg(format!(
                    "unexpected end of stream at byte {offset} of '{}'",
                    res.path()
                )));
            }
            dest.write_all(&chunk).await?;
            offset += chunk.len() as u64;
            on_progress(chunk.len() as u64);
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

        let data = tokio::fs::read(local_file).await?;
        let dest = rpath::join_path(parent.path(), &name);
        self.op
            .write(&rel_of(&dest), data)
            .await
            .map_err(|e| CoreError::repository(format!("uploading to '{dest}' failed"), e))?;
        Ok(dest)
    }

    async fn delete(&self, res: &Resource) -> CoreResult<()> {
        let rel = if res.is_directory() {
            dir_rel_of(res.path())
        } else {
            rel_of(res.path())
        };
        self.op
            .delete(&rel)
            .await
            .map_err(|e| CoreError::repository(format!("deleting '{}' failed", res.path()), e))
    }

    async fn move_to(&self, src: &Resource, dest_dir: &Resource) -> CoreResult<()> {
        ensure_directory(dest_dir)?;
        let dest = rpath::join_path(dest_dir.path(), src.name());
        self.op
            .rename(&rel_of(src.path()), &rel_of(&dest))
            .await
            .map_err(|e| {
                CoreError::repository(
                    format!("moving '{}' to '{dest}' failed", src.path()),
                    e,
                )
            })
    }

    async fn create_directory(&self, parent: &Resource, name: &str) -> CoreResult<String> {
        ensure_directory(parent)?;
        let dir = rpath::join_path(parent.path(), name);
        self.op
            .create_dir(&dir_rel_of(&dir))
            .await
            .map_err(|e| CoreError::repository(format!("creating '{dir}' failed"), e))?;
        Ok(dir)
    }

    async fn search(&self, parent: &Resource, query: &str) -> CoreResult<Vec<Resource>> {
        ensure_directory(parent)?;
        let query_rel = dir_rel_of(parent.path());
        let mut lister = self
            .op
            .lister_with(&query_rel)
            .recursive(true)
            .metakey(Metakey::ContentLength | Metakey::LastModified | Metakey::Mode)
            .await
            .map_err(|e| {
                CoreError::repository(format!("searching under '{}' failed", parent.path()), e)
            })?;

        let mut found = Vec::new();
        while let Some(entry) = lister.try_next().await.map_err(|e| {
            CoreError::repository(format!("searching under '{}' failed", parent.path()), e)
        })? {
            if entry.path().is_empty() || is_echo_of(&query_rel, entry.path()) {
                continue;
            }
            found.push(self.resource_from_parts(entry.path(), entry.metadata()));
        }
        Ok(rank_matches(found, query))
    }

    async fn disconnect(&self) -> CoreResult<()> {
        // Requests carry their own session state; nothing to tear down.
        Ok(())
    }

    fn host(&self) -> &Host {
        &self.host
    }
}
