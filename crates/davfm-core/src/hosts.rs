//! Host profile persistence.
//!
//! Remote hosts live in a versioned TOML file; every mutation rewrites the
//! whole list so the file always round-trips exactly, order preserved.
//! Local hosts are synthesized per run and never written.
//!
//! Credentials are stored in **cleartext** — a known, accepted weakness of
//! the format, kept for compatibility. The `version` field exists so a
//! future revision can migrate the password field to a secret reference
//! without guessing at the schema.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::model::Host;
use crate::repo::open_repository;

const HOSTS_FILE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct HostsFile {
    version: u32,
    #[serde(default, rename = "hosts")]
    records: Vec<HostRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct HostRecord {
    base_uri: String,
    root: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<String>,
    /// Cleartext, see module docs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    password: Option<String>,
}

impl From<&Host> for HostRecord {
    fn from(host: &Host) -> Self {
        Self {
            base_uri: host.base_uri().to_string(),
            root: host.root().to_string(),
            user: host.user().map(str::to_string),
            password: host.password().map(str::to_string),
        }
    }
}

impl HostRecord {
    fn into_host(self) -> Host {
        Host::remote(self.base_uri, self.root, self.user, self.password)
    }
}

/// Durable CRUD store for remote host profiles.
#[derive(Debug)]
pub struct HostStore {
    path: PathBuf,
    hosts: Vec<Host>,
}

impl HostStore {
    /// Loads the store from `path`. A missing file yields an empty store.
    pub fn load(path: impl Into<PathBuf>) -> CoreResult<Self> {
        let path = path.into();
        let hosts = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let file: HostsFile =
                toml::from_str(&content).map_err(|e| CoreError::ConfigParse(e.to_string()))?;
            file.records.into_iter().map(HostRecord::into_host).collect()
        } else {
            Vec::new()
        };
        Ok(Self { path, hosts })
    }

    /// Read-only snapshot of the persisted remote hosts, in stored order.
    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    /// All selectable hosts: the persisted remote ones followed by the
    /// synthesized local filesystem roots.
    pub fn hosts_with_local_roots(&self) -> Vec<Host> {
        let mut all = self.hosts.clone();
        all.extend(Host::local_roots());
        all
    }

    /// Appends a host and immediately persists the full list.
    pub fn add(&mut self, host: Host) -> CoreResult<()> {
        self.hosts.push(host);
        self.save()
    }

    /// Removes a host by identity. Persists only when something was
    /// actually removed; returns whether it was.
    pub fn delete(&mut self, host: &Host) -> CoreResult<bool> {
        let before = self.hosts.len();
        self.hosts.retain(|h| h.id() != host.id());
        let removed = self.hosts.len() != before;
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    fn save(&self) -> CoreResult<()> {
        let file = HostsFile {
            version: HOSTS_FILE_VERSION,
            records: self.hosts.iter().map(HostRecord::from).collect(),
        };
        let content =
            toml::to_string_pretty(&file).map_err(|e| CoreError::ConfigParse(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Validates a host with a live connect-and-list probe against its root.
///
/// Run before persisting a new host so that a mistyped URI or bad
/// credentials surface immediately, with the full error chain available
/// for display.
pub async fn probe_host(host: &Host) -> CoreResult<()> {
    let repo = open_repository(host)?;
    repo.connect().await?;
    repo.list(host.root(), 1).await?;
    repo.disconnect().await
}
