//! Backend abstraction for storebridge.
//!
//! This module provides a trait-based interface for storage backends
//! (local filesystem, in-memory, HTTP) together with the protocol registry
//! that resolves a configured protocol name into a backend, and the connector
//! that builds the shared backend handle lazily.
//!
//! # Design Principles
//! - Backend isolation: no protocol-specific logic outside the backend modules
//! - Async operations: all I/O operations are async
//! - Unified error semantics: every backend maps its failures onto the
//!   common transient/permanent taxonomy

pub mod backend;
pub mod connector;
pub mod http;
pub mod local;
pub mod memory;
pub mod registry;

pub use backend::{Backend, BackendOptions, Mtime, ObjectInfo};
pub use connector::{BackendConnector, ProviderConfig, DEFAULT_PROTOCOL};
pub use http::HttpBackend;
pub use local::{LocalBackend, FILE_SCHEME};
pub use memory::{MemoryBackend, MEMORY_SCHEME};
pub use registry::{create_default_registry, BackendFactory, ProtocolRegistry, ValidatedProtocol};
