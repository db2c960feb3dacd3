//! API gateway routing and dispatch engine.

pub mod config;
pub mod health;
pub mod http;
pub mod kvstore;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod plugin;
pub mod routing;

pub use config::GatewayConfig;
pub use http::Gateway;
pub use lifecycle::Shutdown;
pub use plugin::PluginRegistry;
