//! Resource repository abstraction.
//!
//! [`ResourceRepository`] is the single contract both backends implement:
//! the local filesystem ([`LocalRepository`]) and a remote WebDAV server
//! ([`WebDavRepository`]). Frontends and the navigation engine only ever
//! talk to the trait object returned by [`open_repository`].

pub mod local;
pub mod path;
pub mod webdav;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

use crate::error::{CoreError, CoreResult};
use crate::model::{Host, Resource};

pub use local::LocalRepository;
pub use webdav::WebDavRepository;

/// Incremental progress callback: invoked with the number of bytes
/// transferred since the previous call.
pub type ProgressFn = Box<dyn FnMut(u64) + Send>;

/// Contract shared by all backends.
///
/// Paths are absolute, `/`-delimited and percent-decoded. Every operation
/// that can block runs through `async` and is expected to be driven from a
/// background task, never from the coordinating thread.
#[async_trait]
pub trait ResourceRepository: Send + Sync {
    /// Establishes backend state. A no-op for the local filesystem; opens
    /// and probes an authenticated session for WebDAV. Must be called (and
    /// must succeed) before any other operation.
    async fn connect(&self) -> CoreResult<()>;

    /// Lists resources at `path`.
    ///
    /// `depth == 0` returns exactly the resource at `path` itself;
    /// `depth == 1` returns the immediate children only — the queried path
    /// is filtered out when the underlying protocol echoes it back.
    async fn list(&self, path: &str, depth: u32) -> CoreResult<Vec<Resource>>;

    /// `list(path, 1)` filtered to directories. No additional backend calls.
    async fn list_dirs(&self, path: &str) -> CoreResult<Vec<Resource>> {
        Ok(self
            .list(path, 1)
            .await?
            .into_iter()
            .filter(Resource::is_directory)
            .collect())
    }

    /// `list(path, 1)` filtered to files. No additional backend calls.
    async fn list_files(&self, path: &str) -> CoreResult<Vec<Resource>> {
        Ok(self
            .list(path, 1)
            .await?
            .into_iter()
            .filter(|r| !r.is_directory())
            .collect())
    }

    /// Reads the full content of a file resource.
    async fn get_content(&self, res: &Resource) -> CoreResult<Vec<u8>>;

    /// Streams `res` into the download staging area and returns the local
    /// file path. `on_progress` is invoked with the chunk size after each
    /// chunk is written; the cumulative total equals the resource size on
    /// success.
    async fn download(&self, res: &Resource, on_progress: ProgressFn) -> CoreResult<PathBuf>;

    /// Uploads a local file into the directory `parent` and returns the new
    /// absolute path.
    async fn upload(&self, parent: &Resource, local_file: &Path) -> CoreResult<String>;

    /// Deletes a file or directory resource.
    async fn delete(&self, res: &Resource) -> CoreResult<()>;

    /// Moves `src` into the directory `dest_dir`, keeping its name.
    async fn move_to(&self, src: &Resource, dest_dir: &Resource) -> CoreResult<()>;

    /// Creates a directory named `name` under the directory `parent` and
    /// returns its absolute path.
    async fn create_directory(&self, parent: &Resource, name: &str) -> CoreResult<String>;

    /// Recursively searches under the directory `parent` for entries whose
    /// name matches `query`, best matches first.
    async fn search(&self, parent: &Resource, query: &str) -> CoreResult<Vec<Resource>>;

    /// Tears down backend state. Idempotent: safe on an already
    /// disconnected or never-connected repository.
    async fn disconnect(&self) -> CoreResult<()>;

    /// The host profile this repository serves.
    fn host(&self) -> &Host;
}

/// Creates the repository implementation matching the host profile.
pub fn open_repository(host: &Host) -> CoreResult<Arc<dyn ResourceRepository>> {
    if host.is_local() {
        tracing::debug!(root = host.root(), "opening local repository");
        Ok(Arc::new(LocalRepository::new(host.clone())))
    } else {
        tracing::debug!(base_uri = host.base_uri(), "opening WebDAV repository");
        Ok(Arc::new(WebDavRepository::new(host.clone())?))
    }
}

/// Returns a validation error unless `res` is a directory.
pub(crate) fn ensure_directory(res: &Resource) -> CoreResult<()> {
    if res.is_directory() {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "'{}' is not a directory",
            res.path()
        )))
    }
}

/// Scores `resources` against `query` by fuzzy name match and returns the
/// matching ones, highest score first.
pub(crate) fn rank_matches(resources: Vec<Resource>, query: &str) -> Vec<Resource> {
    let matcher = SkimMatcherV2::default();
    let mut scored: Vec<(i64, Resource)> = resources
        .into_iter()
        .filter_map(|res| {
            matcher
                .fuzzy_match(res.name(), query)
                .map(|score| (score, res))
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().map(|(_, res)| res).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HostId;

    fn res(name: &str, directory: bool) -> Resource {
        Resource::new(
            format!("/files/{name}"),
            name,
            "application/octet-stream",
            1,
            None,
            None,
            directory,
            HostId::new("test"),
        )
    }

    #[test]
    fn ensure_directory_accepts_dirs() {
        assert!(ensure_directory(&res("music", true)).is_ok());
    }

    #[test]
    fn ensure_directory_rejects_files() {
        let err = ensure_directory(&res("a.txt", false)).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(err.to_string().contains("a.txt"));
    }

    #[test]
    fn rank_matches_filters_and_orders() {
        let all = vec![res("notes.txt", false), res("north", true), res("zzz", false)];
        let ranked = rank_matches(all, "not");
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].name(), "notes.txt");
    }

    #[test]
    fn rank_matches_empty_result() {
        let ranked = rank_matches(vec![res("alpha", false)], "qqq");
        assert!(ranked.is_empty());
    }

    #[test]
    fn open_repository_picks_backend() {
        let local = open_repository(&Host::local_root("/")).unwrap();
        assert!(local.host().is_local());
        let remote =
            open_repository(&Host::remote("https://dav.example.com", "/files", None, None))
                .unwrap();
        assert!(!remote.host().is_local());
    }
}
