//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! KV store (kvstore::open(GATEWAY_KVSTORE_URL))
//!     → loader.rs (list servers/, backends/, routes/, listeners/ & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → routing::assembler builds one dispatch table per listener
//!
//! On change of the backing file:
//!     watcher.rs detects change
//!     → loader.rs loads new definitions
//!     → validation.rs validates
//!     → listeners re-assemble and swap their dispatch tables
//! ```
//!
//! # Design Decisions
//! - Definitions are immutable once loaded; changes require full reassembly
//! - All optional fields have defaults to allow minimal definitions
//! - Validation separates syntactic (serde) from semantic checks

pub mod env;
pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BackendConfig, GatewayConfig, GatewaySettings, GuardConfig, HealthCheckConfig,
    ListenerConfig, RouteConfig, ServerConfig, TimeoutConfig,
};
