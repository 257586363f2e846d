//! davfm core library — UI-agnostic file-browser logic.
//!
//! `davfm-core` presents a unified, navigable view over two resource
//! backends: a remote WebDAV server and the local filesystem. It is
//! intentionally decoupled from any UI framework; frontends consume the
//! engine's events and data and never reach the backends directly.
//!
//! # Modules
//!
//! - [`model`] — Value types: [`Resource`] entries and [`Host`] profiles.
//! - [`repo`] — The [`ResourceRepository`] contract with its Local and WebDAV backends.
//! - [`nav`] — The tree/table synchronization engine and listing order.
//! - [`task`] — Cancellable background tasks with progress and message updates.
//! - [`transfers`] — Download/upload tasks with progress wiring.
//! - [`thumbs`] — On-disk thumbnail cache and batch loading.
//! - [`hosts`] — Durable host profile store.
//! - [`session`] — Session state persisted between runs.
//! - [`event`] — Engine → UI notifications.
//! - [`error`] — Unified error type ([`CoreError`]) and result alias ([`CoreResult`]).

pub mod error;
pub mod event;
pub mod hosts;
pub mod model;
pub mod nav;
pub mod repo;
pub mod session;
pub mod task;
pub mod thumbs;
pub mod transfers;

pub use error::{CoreError, CoreResult};
pub use event::NavEvent;
pub use hosts::{probe_host, HostStore};
pub use model::{format_size, Host, HostId, Resource};
pub use nav::{sort_resources, LoadState, NavMessage, NavigationEngine, NodeId};
pub use repo::{
    open_repository, LocalRepository, ProgressFn, ResourceRepository, WebDavRepository,
};
pub use session::Session;
pub use task::{spawn_task, TaskContext, TaskHandle, TaskId, TaskKind, TaskUpdate};
pub use thumbs::{
    render_thumbnail, spawn_thumbnail_batch, ThumbMap, ThumbnailCache, ThumbnailLoader,
};
pub use transfers::{spawn_download_task, spawn_upload_task};

/// Normalises a string to NFC (composed) form.
///
/// Resource names arrive in whatever form the backend stores them — macOS
/// filesystems use NFD, WebDAV servers echo whatever was uploaded. Deep
/// navigation compares names after re-composing both sides.
pub fn nfc_string(s: &str) -> String {
    use unicode_normalization::UnicodeNormalization;
    s.nfc().collect()
}
