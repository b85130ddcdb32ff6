//! In-memory storage backend for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::fs;

use storebridge_common::{Error, Result};

use crate::backend::{Backend, Mtime, ObjectInfo};
use crate::local::map_io_error;

/// Scheme prefix accepted on memory queries.
pub const MEMORY_SCHEME: &str = "memory://";

/// In-memory storage entry.
#[derive(Debug, Clone)]
enum Entry {
    File {
        data: Vec<u8>,
        modified: DateTime<Utc>,
    },
    Directory {
        modified: DateTime<Utc>,
    },
}

impl Entry {
    fn info(&self) -> ObjectInfo {
        match self {
            Entry::File { data, modified } => ObjectInfo {
                size: data.len() as u64,
                mtime: Some(Mtime::DateTime(*modified)),
                is_dir: false,
            },
            Entry::Directory { modified } => ObjectInfo {
                size: 0,
                mtime: Some(Mtime::DateTime(*modified)),
                is_dir: true,
            },
        }
    }
}

/// In-memory storage backend.
///
/// Keys are slash-separated paths without leading or trailing separators;
/// the empty key is the root directory, which always exists. Entries are
/// kept ordered so listings are deterministic. All data is lost on drop.
pub struct MemoryBackend {
    storage: Arc<RwLock<BTreeMap<String, Entry>>>,
}

impl MemoryBackend {
    /// Create a new empty memory backend.
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    fn path_to_key(path: &str) -> String {
        let path = path.strip_prefix(MEMORY_SCHEME).unwrap_or(path);
        path.trim_matches('/').to_string()
    }

    fn parent_key(key: &str) -> &str {
        key.rfind('/').map(|i| &key[..i]).unwrap_or("")
    }

    fn child_prefix(key: &str) -> String {
        if key.is_empty() {
            String::new()
        } else {
            format!("{}/", key)
        }
    }

    /// Verify the parent of `key` is an existing directory.
    fn check_parent(storage: &BTreeMap<String, Entry>, key: &str) -> Result<()> {
        let parent = Self::parent_key(key);
        if parent.is_empty() {
            return Ok(());
        }
        match storage.get(parent) {
            Some(Entry::Directory { .. }) => Ok(()),
            Some(Entry::File { .. }) => {
                Err(Error::InvalidInput(format!("Parent is a file: {}", parent)))
            }
            None => Err(Error::NotFound(format!(
                "Parent directory not found: {}",
                parent
            ))),
        }
    }

    /// Insert directory entries for `key` and all of its ancestors.
    fn insert_dirs(storage: &mut BTreeMap<String, Entry>, key: &str) -> Result<()> {
        let now = Utc::now();
        let mut current = String::new();
        for component in key.split('/').filter(|c| !c.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(component);
            match storage.get(&current) {
                Some(Entry::Directory { .. }) => {}
                Some(Entry::File { .. }) => {
                    return Err(Error::InvalidInput(format!("Parent is a file: {}", current)));
                }
                None => {
                    storage.insert(current.clone(), Entry::Directory { modified: now });
                }
            }
        }
        Ok(())
    }

    /// Store bytes at `path`, creating missing parent directories.
    pub fn write_bytes(&self, path: &str, data: Vec<u8>) -> Result<()> {
        let key = Self::path_to_key(path);
        let mut storage = self.storage.write().unwrap();
        Self::insert_dirs(&mut storage, Self::parent_key(&key))?;
        storage.insert(
            key,
            Entry::File {
                data,
                modified: Utc::now(),
            },
        );
        Ok(())
    }

    /// Read the bytes stored at `path`.
    pub fn read_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let key = Self::path_to_key(path);
        match self.storage.read().unwrap().get(&key) {
            Some(Entry::File { data, .. }) => Ok(data.clone()),
            Some(Entry::Directory { .. }) => {
                Err(Error::InvalidInput(format!("Cannot read directory: {}", path)))
            }
            None => Err(Error::NotFound(format!("File not found: {}", path))),
        }
    }

    /// Collect the files below a directory key, relative to it.
    fn files_under(storage: &BTreeMap<String, Entry>, key: &str) -> Vec<(PathBuf, Vec<u8>)> {
        let prefix = Self::child_prefix(key);
        storage
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, entry)| match entry {
                Entry::File { data, .. } => Some((PathBuf::from(&k[prefix.len()..]), data.clone())),
                Entry::Directory { .. } => None,
            })
            .collect()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a local file or directory tree into (relative path, content) pairs.
async fn read_local_tree(root: &Path) -> Result<Vec<(String, Option<Vec<u8>>)>> {
    let meta = fs::metadata(root).await.map_err(|e| map_io_error(e, root))?;
    if !meta.is_dir() {
        let data = fs::read(root).await.map_err(|e| map_io_error(e, root))?;
        return Ok(vec![(String::new(), Some(data))]);
    }

    let mut results = vec![(String::new(), None)];
    let mut pending = vec![(root.to_path_buf(), String::new())];
    while let Some((dir, rel)) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await.map_err(|e| map_io_error(e, &dir))?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let child_rel = if rel.is_empty() {
                name
            } else {
                format!("{}/{}", rel, name)
            };
            if entry.file_type().await?.is_dir() {
                results.push((child_rel.clone(), None));
                pending.push((entry.path(), child_rel));
            } else {
                let data = fs::read(entry.path()).await?;
                results.push((child_rel, Some(data)));
            }
        }
    }
    Ok(results)
}

#[async_trait]
impl Backend for MemoryBackend {
    fn protocol(&self) -> &str {
        "memory"
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let key = Self::path_to_key(path);
        Ok(key.is_empty() || self.storage.read().unwrap().contains_key(&key))
    }

    async fn info(&self, path: &str) -> Result<ObjectInfo> {
        let key = Self::path_to_key(path);
        if key.is_empty() {
            return Ok(ObjectInfo {
                size: 0,
                mtime: None,
                is_dir: true,
            });
        }
        match self.storage.read().unwrap().get(&key) {
            Some(entry) => Ok(entry.info()),
            None => Err(Error::NotFound(format!("Path not found: {}", path))),
        }
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<()> {
        let key = Self::path_to_key(remote);

        // Snapshot under the lock; the guard must not live across awaits
        let files = {
            let storage = self.storage.read().unwrap();
            match storage.get(&key) {
                Some(Entry::File { data, .. }) => {
                    vec![(PathBuf::new(), data.clone())]
                }
                Some(Entry::Directory { .. }) => Self::files_under(&storage, &key),
                None if key.is_empty() => Self::files_under(&storage, &key),
                None => return Err(Error::NotFound(format!("File not found: {}", remote))),
            }
        };

        if files.len() == 1 && files[0].0.as_os_str().is_empty() {
            fs::write(local, &files[0].1)
                .await
                .map_err(|e| map_io_error(e, local))?;
            return Ok(());
        }

        fs::create_dir_all(local).await.map_err(|e| map_io_error(e, local))?;
        for (rel, data) in files {
            let target = local.join(rel);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| map_io_error(e, parent))?;
            }
            fs::write(&target, data)
                .await
                .map_err(|e| map_io_error(e, &target))?;
        }
        Ok(())
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        let key = Self::path_to_key(remote);
        let tree = read_local_tree(local).await?;

        // Only a directory tree can be merged into the root
        if key.is_empty() && matches!(tree.first(), Some((rel, Some(_))) if rel.is_empty()) {
            return Err(Error::InvalidInput(format!(
                "Cannot upload a file to the root: {}",
                remote
            )));
        }

        let mut storage = self.storage.write().unwrap();
        Self::check_parent(&storage, &key)?;

        let now = Utc::now();
        for (rel, content) in tree {
            let entry_key = match (key.is_empty(), rel.is_empty()) {
                (_, true) => key.clone(),
                (true, false) => rel,
                (false, false) => format!("{}/{}", key, rel),
            };
            let entry = match content {
                Some(data) => Entry::File {
                    data,
                    modified: now,
                },
                None => Entry::Directory { modified: now },
            };
            if !entry_key.is_empty() {
                storage.insert(entry_key, entry);
            }
        }
        Ok(())
    }

    async fn remove(&self, path: &str, recursive: bool) -> Result<()> {
        let key = Self::path_to_key(path);
        if key.is_empty() {
            return Err(Error::InvalidInput("Cannot remove the root".to_string()));
        }

        let mut storage = self.storage.write().unwrap();
        match storage.get(&key) {
            Some(Entry::File { .. }) => {
                storage.remove(&key);
                Ok(())
            }
            Some(Entry::Directory { .. }) => {
                let prefix = Self::child_prefix(&key);
                let children: Vec<String> = storage
                    .range(prefix.clone()..)
                    .take_while(|(k, _)| k.starts_with(&prefix))
                    .map(|(k, _)| k.clone())
                    .collect();
                if !children.is_empty() && !recursive {
                    return Err(Error::InvalidInput(format!("Directory not empty: {}", path)));
                }
                for child in children {
                    storage.remove(&child);
                }
                storage.remove(&key);
                Ok(())
            }
            None => Err(Error::NotFound(format!("File not found: {}", path))),
        }
    }

    async fn make_dirs(&self, path: &str, exist_ok: bool) -> Result<()> {
        let key = Self::path_to_key(path);
        let mut storage = self.storage.write().unwrap();

        if !exist_ok && (key.is_empty() || storage.contains_key(&key)) {
            return Err(Error::AlreadyExists(format!("Path already exists: {}", path)));
        }
        Self::insert_dirs(&mut storage, &key)
    }

    async fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let normalized = Self::path_to_key(pattern);
        let compiled = glob::Pattern::new(&normalized).map_err(|e| {
            Error::InvalidInput(format!("Invalid glob pattern '{}': {}", pattern, e))
        })?;
        let options = glob::MatchOptions {
            require_literal_separator: true,
            ..glob::MatchOptions::new()
        };

        let storage = self.storage.read().unwrap();
        Ok(storage
            .keys()
            .filter(|key| compiled.matches_with(key, options))
            .cloned()
            .collect())
    }

    async fn touch(&self, path: &str, truncate: bool) -> Result<()> {
        let key = Self::path_to_key(path);
        let now = Utc::now();
        let mut storage = self.storage.write().unwrap();

        match storage.get_mut(&key) {
            Some(Entry::File { data, modified }) => {
                if truncate {
                    data.clear();
                }
                *modified = now;
                Ok(())
            }
            Some(Entry::Directory { modified }) => {
                *modified = now;
                Ok(())
            }
            None => {
                Self::check_parent(&storage, &key)?;
                storage.insert(
                    key,
                    Entry::File {
                        data: Vec::new(),
                        modified: now,
                    },
                );
                Ok(())
            }
        }
    }
}
