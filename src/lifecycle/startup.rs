//! Startup orchestration.
//!
//! # Responsibilities
//! - Open the KV store named by the environment
//! - Populate the plugin registry, then freeze it
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Registration happens strictly before any listener is started, so the
//!   request path only ever reads a frozen registry

use std::sync::Arc;

use crate::config::env;
use crate::config::ConfigError;
use crate::kvstore::{self, KvError, KvStore};
use crate::plugin::{PluginRegistry, RegistryError};
use crate::routing::AssemblyError;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("cannot open kv store '{url}': {source}")]
    Store {
        url: String,
        #[source]
        source: KvError,
    },

    #[error("plugin registration failed: {0}")]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("route assembly failed: {0}")]
    Assembly(#[from] AssemblyError),
}

/// What the bootstrap sequence hands to the gateway.
#[derive(Debug, Clone)]
pub struct Environment {
    pub kvstore_url: String,
    pub store: Arc<dyn KvStore>,
    /// Frozen.
    pub registry: Arc<PluginRegistry>,
}

/// Bootstrap from the process environment.
pub fn setup_environment<F>(register_plugins: F) -> Result<Environment, StartupError>
where
    F: FnOnce(&PluginRegistry) -> Result<(), RegistryError>,
{
    setup_environment_with(&env::kv_store_endpoint(), register_plugins)
}

/// Bootstrap against an explicit KV store URL.
pub fn setup_environment_with<F>(
    kvstore_url: &str,
    register_plugins: F,
) -> Result<Environment, StartupError>
where
    F: FnOnce(&PluginRegistry) -> Result<(), RegistryError>,
{
    let store = kvstore::open(kvstore_url).map_err(|source| StartupError::Store {
        url: kvstore_url.to_string(),
        source,
    })?;

    let registry = PluginRegistry::new();
    register_plugins(&registry)?;
    registry.freeze();

    tracing::info!(
        kvstore = %kvstore_url,
        wrappers = ?registry.wrapper_names(),
        adapters = ?registry.adapter_names(),
        "Environment ready"
    );

    Ok(Environment {
        kvstore_url: kvstore_url.to_string(),
        store,
        registry: Arc::new(registry),
    })
}
