//! Download and upload tasks.
//!
//! Thin task wrappers over the repository transfer operations, adding the
//! progress and message stream observers expect. The backend callback
//! reports raw chunk sizes; the task accumulates them against the resource
//! size and finishes with a final 100% update.

use std::path::PathBuf;
use std::sync::Arc;

use crate::model::{format_size, Resource};
use crate::repo::ResourceRepository;
use crate::task::{spawn_task, TaskHandle, TaskKind};

/// Spawns a Download task staging `res` into the repository's downloads
/// directory. The handle resolves to the staged file path.
pub fn spawn_download_task(
    repo: Arc<dyn ResourceRepository>,
    res: Resource,
) -> TaskHandle<PathBuf> {
    spawn_task(TaskKind::Download, move |ctx| async move {
        ctx.message(format!("Downloading '{}'", res.name()));

        let size = res.size().max(0) as u64;
        let progress_ctx = ctx.clone();
        let mut transferred = 0u64;
        let file = repo
            .download(
                &res,
                Box::new(move |bytes_read| {
                    transferred += bytes_read;
                    progress_ctx.progress(transferred, size);
                    progress_ctx.message(format!(
                        "{} downloaded",
                        format_size(transferred as i64)
                    ));
                }),
            )
            .await?;

        ctx.progress(1, 1);
        ctx.message(format!("'{}' downloaded successfully", res.name()));
        Ok(file)
    })
}

/// Spawns an Upload task copying `local_file` into the directory `parent`.
/// The handle resolves to the new absolute path on the backend.
pub fn spawn_upload_task(
    repo: Arc<dyn ResourceRepository>,
    parent: Resource,
    local_file: PathBuf,
) -> TaskHandle<String> {
    spawn_task(TaskKind::Upload, move |ctx| async move {
        ctx.message(format!("Uploading '{}'", local_file.display()));
        let path = repo.upload(&parent, &local_file).await?;
        ctx.progress(1, 1);
        ctx.message(path.clone());
        Ok(path)
    })
}
