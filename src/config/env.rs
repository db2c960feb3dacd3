//! Bootstrap environment variables.

/// URL of the KV store holding the gateway definitions.
pub const KVSTORE_URL: &str = "GATEWAY_KVSTORE_URL";

/// Logging level name (trace, debug, info, warn, error).
pub const LOGGING_LEVEL: &str = "GATEWAY_LOGGING_LEVEL";

/// Address of the optional diagnostics listener.
pub const DIAGNOSTICS_ENDPOINT: &str = "GATEWAY_DIAGNOSTICS_ENDPOINT";

pub const DEFAULT_KVSTORE_URL: &str = "file:///etc/api-gateway/gateway.toml";

/// The KV store URL from the environment, or the default location.
pub fn kv_store_endpoint() -> String {
    std::env::var(KVSTORE_URL).unwrap_or_else(|_| DEFAULT_KVSTORE_URL.to_string())
}
