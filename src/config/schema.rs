//! Configuration schema definitions.
//!
//! This module defines the declarative gateway model read from the KV store.
//! All types derive Serde traits so they can be stored as TOML tables.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The complete gateway model: every definition found in the KV store.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Gateway-wide settings (`gateway/settings`).
    pub settings: GatewaySettings,

    /// Physical backend endpoints (`servers/<name>`).
    pub servers: Vec<ServerConfig>,

    /// Named groups of equivalent servers (`backends/<name>`).
    pub backends: Vec<BackendConfig>,

    /// URI bindings (`routes/<name>`).
    pub routes: Vec<RouteConfig>,

    /// Listeners (`listeners/<name>`).
    pub listeners: Vec<ListenerConfig>,
}

impl GatewayConfig {
    pub fn server(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| s.name == name)
    }

    pub fn backend(&self, name: &str) -> Option<&BackendConfig> {
        self.backends.iter().find(|b| b.name == name)
    }

    pub fn route(&self, name: &str) -> Option<&RouteConfig> {
        self.routes.iter().find(|r| r.name == name)
    }

    pub fn listener(&self, name: &str) -> Option<&ListenerConfig> {
        self.listeners.iter().find(|l| l.name == name)
    }
}

/// Static description of one physical backend endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// Server identifier (the key suffix in the store).
    #[serde(default)]
    pub name: String,

    /// Host name or IP address.
    pub address: String,

    /// TCP port.
    pub port: u16,

    /// Path probed by active health checks.
    #[serde(default = "default_ping_uri")]
    pub ping_uri: String,

    /// Whether this server takes part in active health checks.
    #[serde(default = "default_true")]
    pub health_check: bool,
}

impl ServerConfig {
    pub fn new(name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port,
            ping_uri: default_ping_uri(),
            health_check: true,
        }
    }

    /// `address:port`, bracketing IPv6 literals.
    pub fn authority(&self) -> String {
        if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}

fn default_ping_uri() -> String {
    "/health".to_string()
}

fn default_true() -> bool {
    true
}

/// A named group of servers behind one load balancer.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct BackendConfig {
    #[serde(default)]
    pub name: String,

    /// Server names, in selection order.
    pub servers: Vec<String>,

    /// Load balancing algorithm name.
    #[serde(default = "default_policy")]
    pub load_balancer_policy: String,
}

fn default_policy() -> String {
    "round-robin".to_string()
}

/// Binds a URI root to one or more backends.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RouteConfig {
    #[serde(default)]
    pub name: String,

    /// URI root this route serves (e.g. "/foo").
    pub uri_root: String,

    /// Backend names.
    pub backends: Vec<String>,

    /// Wrapper names applied around this route's handler, outermost first.
    #[serde(default)]
    pub plugins: Vec<String>,

    /// Multi-backend adapter name; when set, all backends are handed to it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_backend_adapter: Option<String>,

    /// Applicability test for routes sharing a URI root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<GuardConfig>,
}

/// Request conditions a route applies to. Empty conditions always match.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct GuardConfig {
    /// Accepted methods (any when empty).
    pub methods: Vec<String>,

    /// Host header to match (exact, case-insensitive).
    pub host: Option<String>,

    /// Header name -> required value.
    pub headers: BTreeMap<String, String>,
}

/// A listener and the routes it serves.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ListenerConfig {
    #[serde(default)]
    pub name: String,

    /// Bind address (e.g., "0.0.0.0:8080").
    pub address: String,

    /// Route names, in priority order.
    pub routes: Vec<String>,

    /// Wrapper names applied to every route of this listener, outermost first.
    #[serde(default)]
    pub plugins: Vec<String>,
}

/// Gateway-wide settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct GatewaySettings {
    /// Active health check settings.
    pub health_check: HealthCheckConfig,

    /// Outbound timeouts.
    pub timeouts: TimeoutConfig,

    /// Largest inbound body accepted on any route.
    pub max_body_bytes: usize,

    /// Reload definitions when the backing file changes.
    pub reload: bool,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            health_check: HealthCheckConfig::default(),
            timeouts: TimeoutConfig::default(),
            max_body_bytes: 2 * 1024 * 1024, // 2MB
            reload: false,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health checks.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Health check timeout in seconds.
    pub timeout_secs: u64,

    /// Number of consecutive failures before marking unhealthy.
    pub unhealthy_threshold: u32,

    /// Number of consecutive successes before marking healthy.
    pub healthy_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 10,
            timeout_secs: 5,
            unhealthy_threshold: 3,
            healthy_threshold: 2,
        }
    }
}

/// Outbound timeouts. Unset means no deadline beyond caller cancellation.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: Option<u64>,

    /// Total time for an outbound request/response in seconds.
    pub request_secs: Option<u64>,
}
