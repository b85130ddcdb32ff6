//! Candidate enumeration for wildcard-bearing queries.

use tracing::{debug, warn};

use storebridge_common::{Operation, WILDCARD_OPEN};
use storebridge_storage::BackendConnector;

use crate::retry::RetryExecutor;

/// The part of a query before its first wildcard placeholder.
///
/// Without a placeholder this is the whole query.
pub fn literal_prefix(query: &str) -> &str {
    match query.find(WILDCARD_OPEN) {
        Some(index) => &query[..index],
        None => query,
    }
}

/// Backend glob pattern listing the candidates for a query.
///
/// The literal prefix is escaped so glob metacharacters in real paths are
/// matched literally. A query without placeholders yields a pattern that
/// matches at most the query itself.
pub fn candidate_pattern(query: &str) -> String {
    match query.find(WILDCARD_OPEN) {
        Some(index) => format!("{}*", glob::Pattern::escape(&query[..index])),
        None => glob::Pattern::escape(query),
    }
}

/// Asks the backend for entries that may match a wildcard query.
///
/// Listing never fails the caller: any backend error, including a
/// construction failure or an exhausted retry budget, yields an empty
/// candidate set. An outage is therefore indistinguishable from "no
/// matches"; the failure is only visible in the log.
pub struct GlobMatcher<'a> {
    connector: &'a BackendConnector,
    retry: &'a RetryExecutor,
}

impl<'a> GlobMatcher<'a> {
    /// Create a matcher over a connector and retry policy.
    pub fn new(connector: &'a BackendConnector, retry: &'a RetryExecutor) -> Self {
        Self { connector, retry }
    }

    /// Candidate paths for `query`, in backend order.
    pub async fn candidates(&self, query: &str) -> Vec<String> {
        let pattern = candidate_pattern(query);

        let backend = match self.connector.handle() {
            Ok(backend) => backend,
            Err(err) => {
                warn!("Listing candidates for '{}' failed: {}", query, err);
                return Vec::new();
            }
        };

        let result = self
            .retry
            .execute(Operation::ListCandidates, query, || {
                let backend = backend.clone();
                let pattern = pattern.clone();
                async move { backend.glob(&pattern).await }
            })
            .await;

        match result {
            Ok(candidates) => {
                debug!(
                    "Found {} candidates for '{}' with pattern '{}'",
                    candidates.len(),
                    query,
                    pattern
                );
                candidates
            }
            Err(err) => {
                warn!("Listing candidates for '{}' failed: {}", query, err);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_prefix() {
        assert_eq!(literal_prefix("a/b/{sample}.txt"), "a/b/");
        assert_eq!(literal_prefix("a/{x}/{y}.txt"), "a/");
        assert_eq!(literal_prefix("{x}.txt"), "");
        assert_eq!(literal_prefix("a/b/c.txt"), "a/b/c.txt");
    }

    #[test]
    fn test_candidate_pattern() {
        assert_eq!(candidate_pattern("a/b/{sample}.txt"), "a/b/*");
        assert_eq!(candidate_pattern("a/b/c.txt"), "a/b/c.txt");
    }

    #[test]
    fn test_candidate_pattern_escapes_metacharacters() {
        assert_eq!(candidate_pattern("runs[1]/{sample}.txt"), "runs[[]1[]]/*");
        assert_eq!(candidate_pattern("what?.txt"), "what[?].txt");
    }
}
