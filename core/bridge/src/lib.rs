//! Storage bridge between a workflow engine and pluggable storage backends.
//!
//! A [`StorageProvider`] is built once from [`ProviderSettings`]: it
//! validates the protocol, owns the lazily constructed backend handle and
//! the retry policy, and knows the local cache root. Every query the engine
//! touches is bound to a [`StorageObject`], which exposes the uniform
//! operation surface (exists, mtime, size, retrieve, store, remove, touch,
//! candidate listing) and maps the query to a stable local path.
//!
//! # Example
//! ```no_run
//! use storebridge::{ProviderSettings, StorageProvider};
//!
//! # async fn run() -> storebridge::Result<()> {
//! let settings = ProviderSettings::new("/tmp/cache").with_protocol("memory");
//! let provider = StorageProvider::new(settings)?;
//!
//! let object = provider.object("results/a.txt")?;
//! if !object.exists().await? {
//!     object.touch().await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod object;
pub mod path;
pub mod provider;
pub mod retry;
pub mod settings;
pub mod wildcard;

pub use object::StorageObject;
pub use path::{local_suffix, query_digest, PathMapper};
pub use provider::{QueryValidation, StorageProvider};
pub use retry::{Attempted, RetryConfig, RetryExecutor, DEFAULT_MAX_ATTEMPTS};
pub use settings::{ProviderSettings, RetrySettings};
pub use wildcard::{candidate_pattern, literal_prefix, GlobMatcher};

pub use storebridge_common::{Error, Operation, Query, Result};
pub use storebridge_storage::{
    create_default_registry, Backend, BackendOptions, ProtocolRegistry,
};
