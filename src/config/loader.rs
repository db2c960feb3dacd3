//! Configuration loading from the KV store.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::schema::{
    BackendConfig, GatewayConfig, GatewaySettings, ListenerConfig, RouteConfig, ServerConfig,
};
use crate::config::validation::{validate_config, ValidationError};
use crate::kvstore::{KvError, KvStore};

pub const SERVERS: &str = "servers";
pub const BACKENDS: &str = "backends";
pub const ROUTES: &str = "routes";
pub const LISTENERS: &str = "listeners";
pub const SETTINGS_KEY: &str = "gateway/settings";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("KV store error: {0}")]
    Store(#[from] KvError),

    #[error("Invalid definition at '{key}': {source}")]
    Decode {
        key: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Cannot encode definition '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: toml::ser::Error,
    },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Definitions that carry their own name, filled from the store key.
trait Named {
    fn set_name(&mut self, name: &str);
}

macro_rules! impl_named {
    ($($ty:ty),*) => {
        $(impl Named for $ty {
            fn set_name(&mut self, name: &str) {
                if self.name.is_empty() {
                    self.name = name.to_string();
                }
            }
        })*
    };
}

impl_named!(ServerConfig, BackendConfig, RouteConfig, ListenerConfig);

fn load_kind<T>(store: &dyn KvStore, kind: &str) -> Result<Vec<T>, ConfigError>
where
    T: DeserializeOwned + Named,
{
    let prefix = format!("{}/", kind);
    let mut items = Vec::new();
    for (key, value) in store.list(&prefix)? {
        let mut item = value
            .try_into::<T>()
            .map_err(|source| ConfigError::Decode { key: key.clone(), source })?;
        item.set_name(&key[prefix.len()..]);
        items.push(item);
    }
    Ok(items)
}

/// Read every definition from the store, without semantic checks.
pub fn read_config(store: &dyn KvStore) -> Result<GatewayConfig, ConfigError> {
    let settings = match store.get(SETTINGS_KEY)? {
        Some(value) => value.try_into::<GatewaySettings>().map_err(|source| ConfigError::Decode {
            key: SETTINGS_KEY.to_string(),
            source,
        })?,
        None => GatewaySettings::default(),
    };

    Ok(GatewayConfig {
        settings,
        servers: load_kind(store, SERVERS)?,
        backends: load_kind(store, BACKENDS)?,
        routes: load_kind(store, ROUTES)?,
        listeners: load_kind(store, LISTENERS)?,
    })
}

/// Load and validate the gateway definitions.
pub fn load_config(store: &dyn KvStore) -> Result<GatewayConfig, ConfigError> {
    let config = read_config(store)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Store one definition under `<kind>/<name>`.
pub fn put_definition<T: Serialize>(
    store: &dyn KvStore,
    kind: &str,
    name: &str,
    definition: &T,
) -> Result<(), ConfigError> {
    let key = format!("{}/{}", kind, name);
    let value = toml::Value::try_from(definition)
        .map_err(|source| ConfigError::Encode { key: key.clone(), source })?;
    store.put(&key, value)?;
    Ok(())
}
