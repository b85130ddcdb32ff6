//! Backend filesystem trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use storebridge_common::Result;

/// Opaque options forwarded verbatim to backend construction.
pub type BackendOptions = serde_json::Map<String, serde_json::Value>;

/// Modification time as reported by a backend.
///
/// Backends differ in how they report timestamps; both forms are accepted
/// and normalized with [`Mtime::epoch_seconds`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Mtime {
    /// Calendar timestamp.
    DateTime(DateTime<Utc>),
    /// Seconds since the Unix epoch.
    Epoch(f64),
}

impl Mtime {
    /// Seconds since the Unix epoch, with sub-second precision.
    pub fn epoch_seconds(&self) -> f64 {
        match self {
            Mtime::DateTime(dt) => {
                dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_nanos()) / 1e9
            }
            Mtime::Epoch(secs) => *secs,
        }
    }
}

impl From<DateTime<Utc>> for Mtime {
    fn from(dt: DateTime<Utc>) -> Self {
        Mtime::DateTime(dt)
    }
}

/// Metadata for a stored object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Last modification time, if the backend reports one.
    pub mtime: Option<Mtime>,
    /// Whether this is a directory.
    pub is_dir: bool,
}

/// Capability set every storage backend provides.
///
/// Paths are query strings as the engine wrote them; each backend strips its
/// own scheme prefix. A single handle is shared by every storage object of a
/// provider, so implementations must tolerate concurrent calls on different
/// paths.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Get the protocol name (e.g., "file", "memory", "http").
    fn protocol(&self) -> &str;

    /// Check if a path exists.
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Get metadata for a path.
    ///
    /// # Errors
    /// - `NotFound` if the path does not exist
    async fn info(&self, path: &str) -> Result<ObjectInfo>;

    /// Copy the object at `remote` to the local file or directory `local`.
    ///
    /// # Preconditions
    /// - Parent of `local` must exist
    async fn download(&self, remote: &str, local: &Path) -> Result<()>;

    /// Copy the local file or directory `local` to `remote`.
    ///
    /// # Preconditions
    /// - Parent "directory" of `remote` must exist on backends that have
    ///   real directories
    async fn upload(&self, local: &Path, remote: &str) -> Result<()>;

    /// Delete a path. Directories require `recursive` unless empty.
    ///
    /// # Errors
    /// - `NotFound` if the path does not exist
    async fn remove(&self, path: &str, recursive: bool) -> Result<()>;

    /// Create a directory and all of its parents.
    ///
    /// A no-op on backends without real directories.
    async fn make_dirs(&self, path: &str, exist_ok: bool) -> Result<()>;

    /// List entries matching a backend-native glob pattern.
    ///
    /// A pattern that matches nothing yields an empty list.
    async fn glob(&self, pattern: &str) -> Result<Vec<String>>;

    /// Create an empty object, or update the modification time of an
    /// existing one. Content is only discarded when `truncate` is set.
    async fn touch(&self, path: &str, truncate: bool) -> Result<()>;
}
