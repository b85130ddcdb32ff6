//! Local filesystem backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;

use storebridge_common::{Error, Result};

use crate::backend::{Backend, BackendOptions, Mtime, ObjectInfo};

/// Scheme prefix accepted on local queries.
pub const FILE_SCHEME: &str = "file://";

/// Local filesystem backend.
///
/// Queries are plain paths, optionally prefixed with `file://`. Absolute
/// paths are used as they are; relative ones resolve against `root` when
/// one is configured, otherwise against the working directory.
pub struct LocalBackend {
    root: Option<PathBuf>,
}

impl LocalBackend {
    /// Create a backend resolving relative paths against the working directory.
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Create a backend resolving relative paths against `root`.
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self {
            root: Some(root.as_ref().to_path_buf()),
        }
    }

    /// Build from backend options.
    ///
    /// # Errors
    /// - `root` is present but not a string
    pub fn from_options(options: &BackendOptions) -> Result<Self> {
        match options.get("root") {
            None => Ok(Self::new()),
            Some(value) => {
                let root = value.as_str().ok_or_else(|| {
                    Error::InvalidInput("Local backend option 'root' must be a string".to_string())
                })?;
                Ok(Self::with_root(root))
            }
        }
    }

    /// Convert a query to a filesystem path.
    fn to_fs_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path.strip_prefix(FILE_SCHEME).unwrap_or(path));
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn create_info(fs_meta: &std::fs::Metadata) -> ObjectInfo {
        let mtime = fs_meta
            .modified()
            .ok()
            .map(|t| Mtime::DateTime(DateTime::<Utc>::from(t)));

        ObjectInfo {
            size: if fs_meta.is_file() { fs_meta.len() } else { 0 },
            mtime,
            is_dir: fs_meta.is_dir(),
        }
    }

    /// Render a matched path back into the caller's path form.
    fn to_query_form(&self, matched: &Path) -> String {
        let relative = match &self.root {
            Some(root) => matched.strip_prefix(root).unwrap_or(matched),
            None => matched,
        };
        relative.to_string_lossy().into_owned()
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Map an I/O error onto the error taxonomy, naming the path involved.
pub(crate) fn map_io_error(err: std::io::Error, path: &Path) -> Error {
    match err.kind() {
        ErrorKind::NotFound => Error::NotFound(format!("{}", path.display())),
        ErrorKind::PermissionDenied => Error::PermissionDenied(format!("{}", path.display())),
        ErrorKind::AlreadyExists => Error::AlreadyExists(format!("{}", path.display())),
        _ => Error::Io(err),
    }
}

/// Copy a file or directory tree from `from` to `to`.
///
/// Directories are walked iteratively; existing files at the destination
/// are overwritten.
pub(crate) async fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    let meta = fs::metadata(from).await.map_err(|e| map_io_error(e, from))?;
    if !meta.is_dir() {
        fs::copy(from, to).await.map_err(|e| map_io_error(e, from))?;
        return Ok(());
    }

    let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];
    while let Some((src, dst)) = pending.pop() {
        fs::create_dir_all(&dst).await.map_err(|e| map_io_error(e, &dst))?;
        let mut entries = fs::read_dir(&src).await.map_err(|e| map_io_error(e, &src))?;
        while let Some(entry) = entries.next_entry().await? {
            let child_dst = dst.join(entry.file_name());
            if entry.file_type().await?.is_dir() {
                pending.push((entry.path(), child_dst));
            } else {
                fs::copy(entry.path(), &child_dst)
                    .await
                    .map_err(|e| map_io_error(e, &entry.path()))?;
            }
        }
    }
    Ok(())
}

#[async_trait]
impl Backend for LocalBackend {
    fn protocol(&self) -> &str {
        "file"
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let fs_path = self.to_fs_path(path);
        Ok(fs::try_exists(&fs_path).await?)
    }

    async fn info(&self, path: &str) -> Result<ObjectInfo> {
        let fs_path = self.to_fs_path(path);
        let fs_meta = fs::metadata(&fs_path)
            .await
            .map_err(|e| map_io_error(e, &fs_path))?;
        Ok(Self::create_info(&fs_meta))
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<()> {
        copy_tree(&self.to_fs_path(remote), local).await
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        copy_tree(local, &self.to_fs_path(remote)).await
    }

    async fn remove(&self, path: &str, recursive: bool) -> Result<()> {
        let fs_path = self.to_fs_path(path);
        let fs_meta = fs::symlink_metadata(&fs_path)
            .await
            .map_err(|e| map_io_error(e, &fs_path))?;

        let result = if !fs_meta.is_dir() {
            fs::remove_file(&fs_path).await
        } else if recursive {
            fs::remove_dir_all(&fs_path).await
        } else {
            fs::remove_dir(&fs_path).await
        };
        result.map_err(|e| map_io_error(e, &fs_path))
    }

    async fn make_dirs(&self, path: &str, exist_ok: bool) -> Result<()> {
        let fs_path = self.to_fs_path(path);
        if !exist_ok && fs::try_exists(&fs_path).await? {
            return Err(Error::AlreadyExists(format!("{}", fs_path.display())));
        }
        fs::create_dir_all(&fs_path)
            .await
            .map_err(|e| map_io_error(e, &fs_path))
    }

    async fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let relative = Path::new(pattern.strip_prefix(FILE_SCHEME).unwrap_or(pattern));
        let full_pattern = match &self.root {
            Some(root) if relative.is_relative() => {
                let root = glob::Pattern::escape(&root.to_string_lossy());
                Path::new(&root).join(relative).to_string_lossy().into_owned()
            }
            _ => relative.to_string_lossy().into_owned(),
        };

        let matches = tokio::task::spawn_blocking(move || -> Result<Vec<PathBuf>> {
            let paths = glob::glob(&full_pattern).map_err(|e| {
                Error::InvalidInput(format!("Invalid glob pattern '{}': {}", full_pattern, e))
            })?;
            // Entries that vanish or cannot be read mid-walk are skipped
            Ok(paths.filter_map(|entry| entry.ok()).collect())
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))??;

        Ok(matches.iter().map(|m| self.to_query_form(m)).collect())
    }

    async fn touch(&self, path: &str, truncate: bool) -> Result<()> {
        let fs_path = self.to_fs_path(path);

        tokio::task::spawn_blocking(move || -> Result<()> {
            if truncate {
                std::fs::File::create(&fs_path).map_err(|e| map_io_error(e, &fs_path))?;
                return Ok(());
            }
            // Append mode never discards content; only the timestamp moves
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&fs_path)
                .map_err(|e| map_io_error(e, &fs_path))?;
            file.set_modified(SystemTime::now())
                .map_err(|e| map_io_error(e, &fs_path))
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_upload_download() {
        let temp = TempDir::new().unwrap();
        let backend = LocalBackend::with_root(temp.path());
        let source = temp.path().join("source.txt");
        std::fs::write(&source, b"Hello, Local!").unwrap();

        backend.upload(&source, "stored.txt").await.unwrap();
        assert!(backend.exists("stored.txt").await.unwrap());

        let target = temp.path().join("fetched.txt");
        backend.download("stored.txt", &target).await.unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"Hello, Local!");
    }

    #[tokio::test]
    async fn test_file_scheme_is_stripped() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("data.bin");
        std::fs::write(&file, [1, 2, 3]).unwrap();

        let backend = LocalBackend::new();
        let query = format!("file://{}", file.display());
        let info = backend.info(&query).await.unwrap();

        assert_eq!(info.size, 3);
        assert!(!info.is_dir);
        assert!(info.mtime.is_some());
    }

    #[tokio::test]
    async fn test_info_missing_is_not_found() {
        let temp = TempDir::new().unwrap();
        let backend = LocalBackend::with_root(temp.path());

        let err = backend.info("missing.txt").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_directory_round_trip() {
        let temp = TempDir::new().unwrap();
        let backend = LocalBackend::with_root(temp.path());
        let source = temp.path().join("src");
        std::fs::create_dir_all(source.join("nested")).unwrap();
        std::fs::write(source.join("a.txt"), b"a").unwrap();
        std::fs::write(source.join("nested/b.txt"), b"b").unwrap();

        backend.upload(&source, "copy").await.unwrap();
        assert_eq!(std::fs::read(temp.path().join("copy/nested/b.txt")).unwrap(), b"b");

        backend.remove("copy", true).await.unwrap();
        assert!(!backend.exists("copy").await.unwrap());
    }

    #[tokio::test]
    async fn test_touch_keeps_content() {
        let temp = TempDir::new().unwrap();
        let backend = LocalBackend::with_root(temp.path());
        std::fs::write(temp.path().join("keep.txt"), b"precious").unwrap();

        backend.touch("keep.txt", false).await.unwrap();
        assert_eq!(std::fs::read(temp.path().join("keep.txt")).unwrap(), b"precious");

        backend.touch("new.txt", false).await.unwrap();
        assert_eq!(backend.info("new.txt").await.unwrap().size, 0);

        backend.touch("keep.txt", true).await.unwrap();
        assert_eq!(backend.info("keep.txt").await.unwrap().size, 0);
    }

    #[tokio::test]
    async fn test_glob_relative_to_root() {
        let temp = TempDir::new().unwrap();
        let backend = LocalBackend::with_root(temp.path());
        backend.make_dirs("a/b", true).await.unwrap();
        std::fs::write(temp.path().join("a/b/x.txt"), b"x").unwrap();
        std::fs::write(temp.path().join("a/b/y.txt"), b"y").unwrap();

        let mut matches = backend.glob("a/b/*").await.unwrap();
        matches.sort();
        assert_eq!(matches, vec!["a/b/x.txt", "a/b/y.txt"]);

        assert!(backend.glob("nothing/*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_make_dirs_exist_ok() {
        let temp = TempDir::new().unwrap();
        let backend = LocalBackend::with_root(temp.path());

        backend.make_dirs("dir", false).await.unwrap();
        backend.make_dirs("dir", true).await.unwrap();
        let err = backend.make_dirs("dir", false).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[test]
    fn test_root_option_must_be_string() {
        let mut options = BackendOptions::new();
        options.insert("root".to_string(), serde_json::json!(42));
        assert!(LocalBackend::from_options(&options).is_err());
    }
}
