//! Connection profiles for resource backends.
//!
//! A [`Host`] describes either a remote WebDAV server or a local filesystem
//! root. Remote hosts are user-created and persisted by
//! [`crate::hosts::HostStore`]; local hosts are synthesized at startup and
//! never written to disk.

use std::fmt;

/// Stable identifier of a host, derived from its base URI and root path.
///
/// Resources carry a `HostId` so that two entries with the same absolute
/// path on different hosts are never confused.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostId(String);

impl HostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A connection profile: base address, credentials, and the root path the
/// tree is anchored at.
#[derive(Debug, Clone, PartialEq)]
pub struct Host {
    id: HostId,
    base_uri: String,
    root: String,
    user: Option<String>,
    password: Option<String>,
    local: bool,
    last_accessed_path: Option<String>,
}

impl Host {
    /// Creates a remote WebDAV host profile.
    pub fn remote(
        base_uri: impl Into<String>,
        root: impl Into<String>,
        user: Option<String>,
        password: Option<String>,
    ) -> Self {
        let base_uri = base_uri.into();
        let root = root.into();
        Self {
            id: HostId::new(format!("{}{}", base_uri.trim_end_matches('/'), root)),
            base_uri,
            root,
            user,
            password,
            local: false,
            last_accessed_path: None,
        }
    }

    /// Creates a local filesystem host anchored at `root`.
    pub fn local_root(root: impl Into<String>) -> Self {
        let root = root.into();
        Self {
            id: HostId::new(format!("file://{root}")),
            base_uri: "file://".to_string(),
            root,
            user: None,
            password: None,
            local: true,
            last_accessed_path: None,
        }
    }

    /// Synthesizes one local host per filesystem root.
    ///
    /// On Unix-like systems there is a single root, `/`.
    pub fn local_roots() -> Vec<Host> {
        vec![Host::local_root("/")]
    }

    pub fn id(&self) -> &HostId {
        &self.id
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    pub fn last_accessed_path(&self) -> Option<&str> {
        self.last_accessed_path.as_deref()
    }

    /// Records the most recently visited path. Consumed by deep navigation
    /// the next time this host is selected.
    pub fn set_last_accessed_path(&mut self, path: Option<String>) {
        self.last_accessed_path = path;
    }

    /// Returns a display label like `"https://dav.example.com"` or `"/"`.
    pub fn display_label(&self) -> String {
        if self.local {
            self.root.clone()
        } else {
            self.base_uri.clone()
        }
    }

    /// The directory bucket thumbnails for this host are cached under.
    ///
    /// Derived from the host name part of the base URI; local hosts (which
    /// have no host name) fall back to a fixed `"local"` bucket.
    pub fn thumb_bucket(&self) -> String {
        if self.local {
            return "local".to_string();
        }
        let after_scheme = match self.base_uri.split_once("://") {
            Some((_, rest)) => rest,
            None => return "local".to_string(),
        };
        let authority = after_scheme.split('/').next().unwrap_or("");
        let host_name = authority.split(':').next().unwrap_or("");
        if host_name.is_empty() {
            "local".to_string()
        } else {
            host_name.to_string()
        }
    }
}
