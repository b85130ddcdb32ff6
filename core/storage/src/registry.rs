//! Protocol registry for backend resolution.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use storebridge_common::{Error, Result};

use crate::backend::{Backend, BackendOptions};

/// Factory function type for creating backends.
pub type BackendFactory =
    Box<dyn Fn(&BackendOptions) -> Result<Arc<dyn Backend>> + Send + Sync>;

/// A protocol name that has been checked against a registry.
///
/// Only [`ProtocolRegistry::resolve`] hands these out.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValidatedProtocol(String);

impl ValidatedProtocol {
    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValidatedProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registry of supported backend protocols.
///
/// Maps protocol names to factories so backends can be selected by the
/// configured protocol string alone.
pub struct ProtocolRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl ProtocolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a backend factory.
    ///
    /// # Errors
    /// - Returns error if name is already registered
    pub fn register(&mut self, name: impl Into<String>, factory: BackendFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::AlreadyExists(format!(
                "Protocol '{}' is already registered",
                name
            )));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Validate a protocol name.
    ///
    /// No backend is constructed; this only checks membership so that
    /// configuration mistakes surface before any connection attempt.
    ///
    /// # Errors
    /// - `InvalidProtocol` if the name is not registered
    pub fn resolve(&self, name: &str) -> Result<ValidatedProtocol> {
        if self.factories.contains_key(name) {
            Ok(ValidatedProtocol(name.to_string()))
        } else {
            Err(Error::InvalidProtocol {
                protocol: name.to_string(),
                supported: self.protocols(),
            })
        }
    }

    /// Construct a backend for a validated protocol.
    ///
    /// # Errors
    /// - `BackendInit` if the factory rejects the options
    pub fn build(
        &self,
        protocol: &ValidatedProtocol,
        options: &BackendOptions,
    ) -> Result<Arc<dyn Backend>> {
        let factory = self.factories.get(protocol.as_str()).ok_or_else(|| {
            Error::InvalidProtocol {
                protocol: protocol.to_string(),
                supported: self.protocols(),
            }
        })?;

        factory(options).map_err(|err| match err {
            Error::BackendInit { .. } => err,
            other => Error::BackendInit {
                protocol: protocol.to_string(),
                reason: other.to_string(),
            },
        })
    }

    /// Get sorted list of registered protocol names.
    pub fn protocols(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a protocol is registered.
    pub fn has_protocol(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Default for ProtocolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn local_factory() -> BackendFactory {
    Box::new(|options| Ok(Arc::new(crate::local::LocalBackend::from_options(options)?)))
}

fn http_factory(scheme: &'static str) -> BackendFactory {
    Box::new(move |options| {
        Ok(Arc::new(crate::http::HttpBackend::from_options(scheme, options)?))
    })
}

/// Create a registry with the built-in backends.
pub fn create_default_registry() -> ProtocolRegistry {
    let mut registry = ProtocolRegistry::new();

    registry
        .register("file", local_factory())
        .expect("Failed to register file backend");
    registry
        .register("local", local_factory())
        .expect("Failed to register local backend");

    // Process-local, mostly useful for testing
    registry
        .register(
            "memory",
            Box::new(|_options| Ok(Arc::new(crate::memory::MemoryBackend::new()))),
        )
        .expect("Failed to register memory backend");

    registry
        .register("http", http_factory("http"))
        .expect("Failed to register http backend");
    registry
        .register("https", http_factory("https"))
        .expect("Failed to register https backend");

    registry
}
