//! Lazily constructed, shared backend handle.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use storebridge_common::Result;

use crate::backend::{Backend, BackendOptions};
use crate::registry::{ProtocolRegistry, ValidatedProtocol};

/// Protocol used when none is configured.
pub const DEFAULT_PROTOCOL: &str = "file";

fn default_protocol() -> String {
    DEFAULT_PROTOCOL.to_string()
}

/// Which backend to talk to and how to construct it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Registered protocol name (e.g., "file", "memory", "https").
    #[serde(default = "default_protocol")]
    pub protocol: String,
    /// Backend-specific options, passed through unvalidated.
    #[serde(default)]
    pub options: BackendOptions,
}

impl ProviderConfig {
    /// Create a config for a protocol with no options.
    pub fn new(protocol: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            options: BackendOptions::new(),
        }
    }

    /// Add a backend option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PROTOCOL)
    }
}

/// Owns the single backend handle of a provider.
///
/// The protocol is validated when the connector is created; the backend
/// itself is only built on the first call to [`BackendConnector::handle`].
/// Construction runs at most once, even when several threads race on first
/// use, and a failed construction is not cached so a later call may retry it.
pub struct BackendConnector {
    registry: Arc<ProtocolRegistry>,
    protocol: ValidatedProtocol,
    options: BackendOptions,
    handle: OnceCell<Arc<dyn Backend>>,
}

impl BackendConnector {
    /// Create a connector for the given configuration.
    ///
    /// # Errors
    /// - `InvalidProtocol` if the protocol is not registered
    pub fn new(registry: Arc<ProtocolRegistry>, config: &ProviderConfig) -> Result<Self> {
        let protocol = registry.resolve(&config.protocol)?;
        Ok(Self {
            registry,
            protocol,
            options: config.options.clone(),
            handle: OnceCell::new(),
        })
    }

    /// Get the shared backend handle, constructing it on first use.
    ///
    /// # Errors
    /// - `BackendInit` if the backend rejects the protocol/options
    pub fn handle(&self) -> Result<Arc<dyn Backend>> {
        self.handle
            .get_or_try_init(|| {
                debug!("Initializing backend for protocol: {}", self.protocol);
                self.registry.build(&self.protocol, &self.options)
            })
            .cloned()
    }

    /// The validated protocol of this connector.
    pub fn protocol(&self) -> &ValidatedProtocol {
        &self.protocol
    }

    /// Whether the backend has been constructed yet.
    pub fn is_initialized(&self) -> bool {
        self.handle.get().is_some()
    }
}
