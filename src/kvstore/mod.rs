//! Key-value store abstraction holding the gateway definitions.
//!
//! # Data Flow
//! ```text
//! GATEWAY_KVSTORE_URL (file:///path/gateway.toml)
//!     → open() picks a backend by URL scheme
//!     → config::loader reads servers/, backends/, routes/, listeners/
//!     → gateway-cli writes definitions with put()
//! ```
//!
//! # Design Decisions
//! - Keys are `<kind>/<name>`; values are TOML values
//! - Reads go to the backing store every time so reloads see fresh data
//! - Only the `file` scheme is built in

pub mod file;

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

pub use file::FileKvStore;

/// Errors raised by KV store backends.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("invalid kv store url '{0}'")]
    InvalidUrl(String),

    #[error("unsupported kv store scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("invalid key '{0}'")]
    InvalidKey(String),

    #[error("kv store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("kv store parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("kv store encode error: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// A store of TOML values addressed by `<kind>/<name>` keys.
pub trait KvStore: Send + Sync + Debug {
    /// Fetch a single value.
    fn get(&self, key: &str) -> Result<Option<toml::Value>, KvError>;

    /// Fetch every entry whose key starts with `prefix`, ordered by key.
    fn list(&self, prefix: &str) -> Result<Vec<(String, toml::Value)>, KvError>;

    /// Insert or replace a value.
    fn put(&self, key: &str, value: toml::Value) -> Result<(), KvError>;

    /// Remove a value. Returns whether it existed.
    fn delete(&self, key: &str) -> Result<bool, KvError>;

    /// Local file backing this store, if any (used for reload watching).
    fn backing_file(&self) -> Option<&Path> {
        None
    }
}

/// Open the store named by `url`.
pub fn open(url: &str) -> Result<Arc<dyn KvStore>, KvError> {
    let parsed = url::Url::parse(url).map_err(|_| KvError::InvalidUrl(url.to_string()))?;
    match parsed.scheme() {
        "file" => {
            let path = parsed
                .to_file_path()
                .map_err(|_| KvError::InvalidUrl(url.to_string()))?;
            Ok(Arc::new(FileKvStore::new(path)))
        }
        other => Err(KvError::UnsupportedScheme(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_file_url() {
        let store = open("file:///tmp/gateway-test.toml").unwrap();
        assert_eq!(
            store.backing_file(),
            Some(Path::new("/tmp/gateway-test.toml"))
        );
    }

    #[test]
    fn test_open_rejects_other_schemes() {
        assert!(matches!(
            open("consul://localhost:8500"),
            Err(KvError::UnsupportedScheme(s)) if s == "consul"
        ));
        assert!(matches!(open("something"), Err(KvError::InvalidUrl(_))));
    }
}
