//! Common types used throughout storebridge.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker that opens an unresolved wildcard placeholder, as in `{sample}`.
pub const WILDCARD_OPEN: char = '{';

/// Caller-supplied identifier for a logical storage object.
///
/// May be a local path, a URI with a protocol scheme, or contain wildcard
/// placeholders. A query is never normalized: two distinct strings are two
/// distinct objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Query(String);

impl Query {
    /// Create a new Query from a string.
    ///
    /// # Errors
    /// - Returns error if the query is empty or contains a NUL byte
    pub fn new(query: impl Into<String>) -> crate::Result<Self> {
        let query = query.into();
        if query.is_empty() {
            return Err(crate::Error::InvalidInput(
                "Query cannot be empty".to_string(),
            ));
        }
        if query.contains('\0') {
            return Err(crate::Error::InvalidInput(format!(
                "Query cannot contain NUL bytes: {:?}",
                query
            )));
        }
        Ok(Self(query))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the query still contains an unresolved wildcard placeholder.
    pub fn has_wildcards(&self) -> bool {
        self.0.contains(WILDCARD_OPEN)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Query {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Operations a storage object exposes, used to label errors and log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    Exists,
    Mtime,
    Size,
    Retrieve,
    Store,
    Remove,
    Touch,
    ListCandidates,
    /// Removal of the local copy; never reaches a backend.
    Cleanup,
}

impl Operation {
    /// Lowercase name of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Exists => "exists",
            Operation::Mtime => "mtime",
            Operation::Size => "size",
            Operation::Retrieve => "retrieve",
            Operation::Store => "store",
            Operation::Remove => "remove",
            Operation::Touch => "touch",
            Operation::ListCandidates => "list-candidates",
            Operation::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_creation() {
        let query = Query::new("s3://bucket/data.csv").unwrap();
        assert_eq!(query.as_str(), "s3://bucket/data.csv");
        assert!(!query.has_wildcards());
    }

    #[test]
    fn test_query_empty_fails() {
        assert!(Query::new("").is_err());
    }

    #[test]
    fn test_query_nul_fails() {
        assert!(Query::new("a\0b").is_err());
    }

    #[test]
    fn test_query_wildcards() {
        let query = Query::new("results/{sample}.txt").unwrap();
        assert!(query.has_wildcards());
    }

    #[test]
    fn test_operation_display() {
        assert_eq!(Operation::ListCandidates.to_string(), "list-candidates");
        assert_eq!(Operation::Retrieve.to_string(), "retrieve");
    }
}
