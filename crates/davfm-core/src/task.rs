//! Cancellable background tasks.
//!
//! Every long-running operation (listing, download, upload, thumbnail
//! batch) runs as a [`spawn_task`] body on its own tokio task. Observers
//! never touch task state directly; they consume [`TaskUpdate`] messages
//! from the handle's channel. Cancellation is cooperative: the body checks
//! [`TaskContext::is_cancelled`] between work units, and a cancelled task
//! still settles into exactly one terminal update.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::error::{CoreError, CoreResult};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of a spawned task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// What kind of work a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    List,
    Download,
    Upload,
    Thumbnail,
}

/// Progress notification delivered to observers.
///
/// A task emits any number of `Progress`/`Message` updates followed by
/// exactly one terminal update (`Completed`, `Failed`, or `Cancelled`).
#[derive(Debug, Clone, PartialEq)]
pub enum TaskUpdate {
    /// Fraction of the work done, in `[0, 1]`.
    Progress(f64),
    /// Human-readable status line.
    Message(String),
    Completed,
    Failed(String),
    Cancelled,
}

impl TaskUpdate {
    /// `true` for `Completed`, `Failed`, and `Cancelled`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskUpdate::Completed | TaskUpdate::Failed(_) | TaskUpdate::Cancelled
        )
    }
}

/// Handed to the task body; the only way work reports back.
#[derive(Clone)]
pub struct TaskContext {
    cancelled: Arc<AtomicBool>,
    updates: UnboundedSender<TaskUpdate>,
}

impl TaskContext {
    /// Checked between work units. Once `true`, the body should stop as
    /// soon as it reaches a consistent point — never mid-write.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Reports progress as `done` of `total` units.
    pub fn progress(&self, done: u64, total: u64) {
        let fraction = if total == 0 {
            1.0
        } else {
            (done as f64 / total as f64).clamp(0.0, 1.0)
        };
        let _ = self.updates.send(TaskUpdate::Progress(fraction));
    }

    /// Reports a status message.
    pub fn message(&self, message: impl Into<String>) {
        let _ = self.updates.send(TaskUpdate::Message(message.into()));
    }
}

/// Observer-side handle of a spawned task.
pub struct TaskHandle<T> {
    id: TaskId,
    kind: TaskKind,
    cancelled: Arc<AtomicBool>,
    updates: UnboundedReceiver<TaskUpdate>,
    join: JoinHandle<CoreResult<T>>,
}

impl<T> TaskHandle<T> {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Requests cooperative cancellation. Returns immediately; the task
    /// settles on its own once it observes the flag.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// The update stream. Ends after the terminal update once the task
    /// body has returned.
    pub fn updates(&mut self) -> &mut UnboundedReceiver<TaskUpdate> {
        &mut self.updates
    }

    /// Waits for the task to settle and returns its result.
    pub async fn join(self) -> CoreResult<T> {
        match self.join.await {
            Ok(result) => result,
            Err(e) => Err(CoreError::repository(
                format!("{} did not settle", self.id),
                e,
            )),
        }
    }
}

/// Spawns `f` as a background task of the given kind.
pub fn spawn_task<T, F, Fut>(kind: TaskKind, f: F) -> TaskHandle<T>
where
    T: Send + 'static,
    F: FnOnce(TaskContext) -> Fut + Send + 'static,
    Fut: Future<Output = CoreResult<T>> + Send + 'static,
{
    let id = TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed));
    let (tx, rx) = unbounded_channel();
    let cancelled = Arc::new(AtomicBool::new(false));

    let ctx = TaskContext {
        cancelled: cancelled.clone(),
        updates: tx.clone(),
    };
    let flag = cancelled.clone();
    let join = tokio::spawn(async move {
        let result = f(ctx).await;
        let terminal = if flag.load(Ordering::SeqCst) {
            TaskUpdate::Cancelled
        } else {
            match &result {
                Ok(_) => TaskUpdate::Completed,
                Err(e) => TaskUpdate::Failed(e.message_chain().join(": ")),
            }
        };
        let _ = tx.send(terminal);
        result
    });

    TaskHandle {
        id,
        kind,
        cancelled,
        updates: rx,
        join,
    }
}
