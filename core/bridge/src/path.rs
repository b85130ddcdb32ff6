//! Mapping of queries to local cache paths.

use blake2::digest::consts::U16;
use blake2::{Blake2b, Digest};
use std::path::{Component, Path, PathBuf};

use storebridge_storage::FILE_SCHEME;

/// Cache subdirectory holding copies of remote-looking queries.
pub const REMOTE_DIR: &str = "remote";

/// Basename used when a query has no final path segment.
const EMPTY_BASENAME: &str = "_";

/// Stand-in for `..` so local paths never leave the cache root.
const PARENT_COMPONENT: &str = "__up__";

/// Prefixes that mark a query as a local filesystem location.
const LOCAL_MARKERS: [&str; 4] = [FILE_SCHEME, "/", "./", "../"];

/// Whether a query denotes a local filesystem location.
pub fn is_local_query(query: &str) -> bool {
    LOCAL_MARKERS.iter().any(|marker| query.starts_with(marker))
}

/// Hex-encoded 128-bit BLAKE2b digest of the full query string.
pub fn query_digest(query: &str) -> String {
    let mut hasher = Blake2b::<U16>::new();
    hasher.update(query.as_bytes());
    hex::encode(hasher.finalize())
}

/// Unique relative path under the cache root for a query.
///
/// Local queries keep their readable path (scheme and root stripped);
/// everything else lands in `remote/<digest>/<basename>`. The function is
/// pure, and distinct remote queries never share a digest directory.
pub fn local_suffix(query: &str) -> PathBuf {
    if is_local_query(query) {
        let stripped = query.strip_prefix(FILE_SCHEME).unwrap_or(query);
        let mut suffix = PathBuf::new();
        for component in Path::new(stripped).components() {
            match component {
                Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
                Component::ParentDir => suffix.push(PARENT_COMPONENT),
                Component::Normal(part) => suffix.push(part),
            }
        }
        if !suffix.as_os_str().is_empty() {
            return suffix;
        }
    }
    hashed_suffix(query)
}

fn hashed_suffix(query: &str) -> PathBuf {
    let basename = Path::new(query)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or(EMPTY_BASENAME);

    let digest = query_digest(query);
    [REMOTE_DIR, digest.as_str(), basename].iter().collect()
}

/// Resolves queries to locations under a cache root.
#[derive(Debug, Clone)]
pub struct PathMapper {
    cache_root: PathBuf,
}

impl PathMapper {
    /// Create a mapper rooted at `cache_root`.
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
        }
    }

    /// The cache root.
    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Absolute (or cache-root-relative) local path for a query.
    pub fn local_path(&self, query: &str) -> PathBuf {
        self.cache_root.join(local_suffix(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_absolute_path_drops_root() {
        assert_eq!(local_suffix("/data/run1/out.txt"), PathBuf::from("data/run1/out.txt"));
    }

    #[test]
    fn test_file_scheme_stripped() {
        assert_eq!(local_suffix("file:///data/out.txt"), PathBuf::from("data/out.txt"));
        assert_eq!(local_suffix("file://rel/out.txt"), PathBuf::from("rel/out.txt"));
    }

    #[test]
    fn test_relative_dot_paths() {
        assert_eq!(local_suffix("./results/a.txt"), PathBuf::from("results/a.txt"));
        assert_eq!(local_suffix("../shared/a.txt"), PathBuf::from("__up__/shared/a.txt"));
    }

    #[test]
    fn test_remote_query_hashed() {
        let suffix = local_suffix("s3://bucket/dir/data.csv");
        let parts: Vec<_> = suffix.iter().map(|p| p.to_str().unwrap()).collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "remote");
        assert_eq!(parts[1].len(), 32);
        assert!(parts[1].chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(parts[2], "data.csv");
    }

    #[test]
    fn test_plain_relative_query_is_remote_looking() {
        let suffix = local_suffix("myfile.txt");
        assert!(suffix.starts_with(REMOTE_DIR));
        assert!(suffix.ends_with("myfile.txt"));
    }

    #[test]
    fn test_same_basename_different_queries() {
        let a = local_suffix("s3://bucket-a/data.csv");
        let b = local_suffix("s3://bucket-b/data.csv");
        assert_ne!(a, b);
        assert_eq!(a.file_name(), b.file_name());
    }

    #[test]
    fn test_empty_and_root_fallback() {
        for query in ["", "/", "file://", "./", "s3://"] {
            let suffix = local_suffix(query);
            assert!(!suffix.as_os_str().is_empty(), "empty suffix for {:?}", query);
            assert!(suffix.starts_with(REMOTE_DIR), "unexpected suffix for {:?}", query);
        }
        assert!(local_suffix("").ends_with(EMPTY_BASENAME));
    }

    #[test]
    fn test_local_path_under_cache_root() {
        let mapper = PathMapper::new("/cache");
        assert_eq!(
            mapper.local_path("/data/out.txt"),
            PathBuf::from("/cache/data/out.txt")
        );
        assert!(mapper.local_path("../../etc/passwd").starts_with("/cache"));
    }

    proptest! {
        #[test]
        fn prop_local_suffix_deterministic(query in ".*") {
            prop_assert_eq!(local_suffix(&query), local_suffix(&query));
        }

        #[test]
        fn prop_remote_queries_never_collide(
            a in "[a-z0-9]{1,8}://[a-z0-9/._-]{0,24}",
            b in "[a-z0-9]{1,8}://[a-z0-9/._-]{0,24}",
        ) {
            prop_assume!(a != b);
            prop_assert_ne!(local_suffix(&a), local_suffix(&b));
        }
    }
}
