//! Per-query storage object.

use once_cell::sync::OnceCell;
use std::future::Future;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use storebridge_common::{Error, Operation, Query, Result};
use storebridge_storage::Backend;

use crate::provider::{ProviderContext, StorageProvider};
use crate::wildcard::GlobMatcher;

/// Parent "directory" of a query that must exist before an upload.
///
/// `None` when the query has no parent or the parent is a scheme root,
/// the filesystem root or the current directory.
fn remote_parent(query: &str) -> Option<&str> {
    let (parent, _) = query.trim_end_matches('/').rsplit_once('/')?;
    let trivial = parent.is_empty()
        || parent == "."
        || parent.ends_with(':')
        || parent.ends_with(":/")
        || parent.ends_with("://");
    if trivial {
        None
    } else {
        Some(parent)
    }
}

/// A query bound to its provider.
///
/// Every physical call goes through the provider's retry policy, except
/// `touch`. Objects are cheap; create one per query.
pub struct StorageObject {
    query: Query,
    context: Arc<ProviderContext>,
    local_path: OnceCell<std::path::PathBuf>,
}

impl StorageObject {
    pub(crate) fn new(query: Query, context: Arc<ProviderContext>) -> Self {
        Self {
            query,
            context,
            local_path: OnceCell::new(),
        }
    }

    /// The bound query.
    pub fn query(&self) -> &str {
        self.query.as_str()
    }

    /// The query with credentials redacted, for logs.
    pub fn safe_query(&self) -> String {
        StorageProvider::safe_print(self.query.as_str())
    }

    /// Local cache location of this object, computed once per instance.
    pub fn local_path(&self) -> &Path {
        self.local_path
            .get_or_init(|| self.context.mapper.local_path(self.query.as_str()))
    }

    /// The shared backend handle; construction failures name `operation`.
    fn backend(&self, operation: Operation) -> Result<Arc<dyn Backend>> {
        self.context
            .connector
            .handle()
            .map_err(|err| err.in_operation(operation, self.query.as_str()))
    }

    fn local_error(&self, operation: Operation, path: &Path, source: std::io::Error) -> Error {
        Error::LocalFilesystem {
            operation,
            query: self.query.as_str().to_string(),
            path: path.to_path_buf(),
            source,
        }
    }

    /// Run a backend call under the retry policy, labelling failures.
    async fn run<T, F, Fut>(&self, operation: Operation, f: F) -> Result<T>
    where
        F: Fn(Arc<dyn Backend>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let backend = self.backend(operation)?;
        let query = self.query.as_str();
        self.context
            .retry
            .execute(operation, query, || f(backend.clone()))
            .await
            .map_err(|err| err.in_operation(operation, query))
    }

    /// Check if the object exists. A missing object is `false`, not an error.
    pub async fn exists(&self) -> Result<bool> {
        let query = self.query.as_str();
        self.run(Operation::Exists, move |backend| async move {
            backend.exists(query).await
        })
        .await
    }

    /// Modification time in seconds since the Unix epoch.
    ///
    /// # Errors
    /// - `NotFound` if the object does not exist
    /// - `NotSupported` if the backend reports no modification time
    pub async fn mtime(&self) -> Result<f64> {
        let query = self.query.as_str();
        let info = self
            .run(Operation::Mtime, move |backend| async move {
                backend.info(query).await
            })
            .await?;

        info.mtime.map(|mtime| mtime.epoch_seconds()).ok_or_else(|| {
            Error::NotSupported(format!(
                "{} '{}': backend reports no modification time",
                Operation::Mtime,
                query
            ))
        })
    }

    /// Size of the object in bytes.
    ///
    /// # Errors
    /// - `NotFound` if the object does not exist
    pub async fn size(&self) -> Result<u64> {
        let query = self.query.as_str();
        let info = self
            .run(Operation::Size, move |backend| async move {
                backend.info(query).await
            })
            .await?;
        Ok(info.size)
    }

    /// Download the object to its local path.
    ///
    /// Parent directories of the local path are created first; failing to
    /// create them is not retried.
    pub async fn retrieve(&self) -> Result<()> {
        let query = self.query.as_str();
        let local_path = self.local_path();
        debug!("Retrieving {} to {}", self.safe_query(), local_path.display());

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| self.local_error(Operation::Retrieve, parent, source))?;
        }

        self.run(Operation::Retrieve, move |backend| async move {
            backend.download(query, local_path).await
        })
        .await?;

        debug!(
            "Local path exists after retrieve: {}",
            local_path.exists()
        );
        Ok(())
    }

    /// Upload the local copy of the object to the backend.
    ///
    /// The parent "directory" of the query is created on the backend first.
    pub async fn store(&self) -> Result<()> {
        let query = self.query.as_str();
        let local_path = self.local_path();
        let parent = remote_parent(query);
        debug!("Storing {} to {}", local_path.display(), self.safe_query());

        self.run(Operation::Store, move |backend| async move {
            if let Some(parent) = parent {
                debug!("Creating remote directory: {}", parent);
                backend.make_dirs(parent, true).await?;
            }
            backend.upload(local_path, query).await
        })
        .await
    }

    /// Delete the object, recursively for directories.
    ///
    /// Removing an object that does not exist succeeds.
    pub async fn remove(&self) -> Result<()> {
        let query = self.query.as_str();
        let result = self
            .run(Operation::Remove, move |backend| async move {
                backend.remove(query, true).await
            })
            .await;

        match result {
            Err(err) if err.is_not_found() => {
                debug!("Nothing to remove at {}", self.safe_query());
                Ok(())
            }
            other => other,
        }
    }

    /// Create the object empty, or bump its modification time.
    ///
    /// Existing content is never truncated.
    pub async fn touch(&self) -> Result<()> {
        let query = self.query.as_str();
        let backend = self.backend(Operation::Touch)?;
        backend
            .touch(query, false)
            .await
            .map_err(|err| err.in_operation(Operation::Touch, query))
    }

    /// Candidate paths for a query that may contain wildcard placeholders.
    ///
    /// Never fails; listing errors yield an empty list.
    pub async fn list_candidate_matches(&self) -> Vec<String> {
        GlobMatcher::new(&self.context.connector, &self.context.retry)
            .candidates(self.query.as_str())
            .await
    }

    /// Delete the local copy of the object, if any.
    pub async fn cleanup(&self) -> Result<()> {
        let path = self.local_path();
        let local_error = |source| self.local_error(Operation::Cleanup, path, source);

        let meta = match tokio::fs::symlink_metadata(path).await {
            Ok(meta) => meta,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(local_error(err)),
        };

        if meta.is_dir() {
            tokio::fs::remove_dir_all(path).await.map_err(local_error)
        } else {
            tokio::fs::remove_file(path).await.map_err(local_error)
        }
    }
}

impl std::fmt::Debug for StorageObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageObject")
            .field("query", &self.safe_query())
            .field("protocol", &self.context.connector.protocol().as_str())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ProviderSettings;
    use tempfile::TempDir;

    fn memory_provider(temp: &TempDir) -> StorageProvider {
        StorageProvider::new(ProviderSettings::new(temp.path()).with_protocol("memory")).unwrap()
    }

    #[test]
    fn test_remote_parent() {
        assert_eq!(remote_parent("a/b/c.txt"), Some("a/b"));
        assert_eq!(remote_parent("s3://bucket/key.txt"), Some("s3://bucket"));
        assert_eq!(remote_parent("file:///tmp/x/y.txt"), Some("file:///tmp/x"));
        assert_eq!(remote_parent("myfile.txt"), None);
        assert_eq!(remote_parent("/top.txt"), None);
        assert_eq!(remote_parent("./here.txt"), None);
        assert_eq!(remote_parent("memory://top.txt"), None);
        assert_eq!(remote_parent("file:///top.txt"), None);
    }

    #[test]
    fn test_local_path_memoized() {
        let temp = TempDir::new().unwrap();
        let object = memory_provider(&temp).object("s3://bucket/data.csv").unwrap();

        let first = object.local_path() as *const Path;
        let second = object.local_path() as *const Path;
        assert_eq!(first, second);
        assert!(object.local_path().starts_with(temp.path()));
        assert!(object.local_path().ends_with("data.csv"));
    }

    #[tokio::test]
    async fn test_mtime_and_size() {
        let temp = TempDir::new().unwrap();
        let provider = memory_provider(&temp);
        let object = provider.object("b.txt").unwrap();

        let err = object.size().await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("size 'b.txt'"));

        let err = object.mtime().await.unwrap_err();
        assert!(err.is_not_found());

        object.touch().await.unwrap();
        assert_eq!(object.size().await.unwrap(), 0);
        assert!(object.mtime().await.unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_touch_missing_parent_carries_context() {
        let temp = TempDir::new().unwrap();
        let object = memory_provider(&temp).object("a/b.txt").unwrap();

        let err = object.touch().await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("touch 'a/b.txt'"));
    }

    #[tokio::test]
    async fn test_store_creates_remote_parent() {
        let temp = TempDir::new().unwrap();
        let provider = memory_provider(&temp);
        let object = provider.object("runs/1/out.txt").unwrap();

        std::fs::create_dir_all(object.local_path().parent().unwrap()).unwrap();
        std::fs::write(object.local_path(), b"result").unwrap();
        object.store().await.unwrap();

        assert!(object.exists().await.unwrap());
        assert_eq!(object.size().await.unwrap(), 6);
        assert!(provider.object("runs/1").unwrap().exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_removes_local_copy() {
        let temp = TempDir::new().unwrap();
        let object = memory_provider(&temp).object("s3://bucket/data.csv").unwrap();

        object.cleanup().await.unwrap();

        std::fs::create_dir_all(object.local_path().parent().unwrap()).unwrap();
        std::fs::write(object.local_path(), b"cached").unwrap();
        object.cleanup().await.unwrap();
        assert!(!object.local_path().exists());
    }
}
