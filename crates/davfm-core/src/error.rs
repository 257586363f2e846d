//! Error types for `davfm-core`.
//!
//! All fallible operations in the core library return [`CoreResult<T>`],
//! which is an alias for `Result<T, CoreError>`.

use std::error::Error as StdError;

/// Boxed source error carried inside [`CoreError::Repository`].
pub type BoxedError = Box<dyn StdError + Send + Sync + 'static>;

/// Unified error type for all core operations.
///
/// Each variant captures just enough context for the caller to display
/// a meaningful message or take corrective action. Repository errors keep
/// their underlying cause so the full chain can be shown to the user via
/// [`CoreError::message_chain`].
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Connecting or authenticating to a backend failed. Fatal to the
    /// operation that triggered it, never to the engine.
    #[error("connect failed: {0}")]
    Connect(String),

    /// A list/read/write/delete/move/mkdir operation failed on a backend.
    #[error("{context}")]
    Repository {
        context: String,
        #[source]
        source: Option<BoxedError>,
    },

    /// An operation was attempted on the wrong kind of resource,
    /// e.g. uploading into a file instead of a directory.
    #[error("validation: {0}")]
    Validation(String),

    /// Thumbnail fetch or decode failed. Logged and skipped by batch jobs,
    /// never propagated to the batch caller.
    #[error("thumbnail cache: {0}")]
    Cache(String),

    /// Failed to parse a TOML configuration or host file.
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// An I/O error that doesn't fit a more specific variant.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Wraps an underlying error into a [`CoreError::Repository`] with
    /// human-readable context.
    pub fn repository(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Repository {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    /// A [`CoreError::Repository`] without an underlying cause.
    pub fn repository_msg(context: impl Into<String>) -> Self {
        Self::Repository {
            context: context.into(),
            source: None,
        }
    }

    /// Flattens the cause chain into a list of messages, outermost first.
    ///
    /// Used for diagnostic display: a failed connect or list surfaces every
    /// message in the chain, not just the top-level one.
    pub fn message_chain(&self) -> Vec<String> {
        let mut chain = vec![self.to_string()];
        let mut source = self.source();
        while let Some(err) = source {
            chain.push(err.to_string());
            source = err.source();
        }
        chain
    }
}

/// Convenience alias used throughout `davfm-core`.
pub type CoreResult<T> = Result<T, CoreError>;
