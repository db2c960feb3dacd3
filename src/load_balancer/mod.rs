//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Backend definition (name, servers, policy)
//!     → AlgorithmRegistry::instantiate (policy name → Selector)
//!     → LoadBalancer (owns Arc<Server> list + Selector)
//!
//! Per request:
//!     → LoadBalancer::select()
//!     → Selector::next_server (healthy servers only):
//!         - round_robin.rs (rotate through servers)
//!         - least_conn.rs (pick server with fewest in-flight forwards)
//!         - random.rs (uniform pick)
//!     → ServerGuard (counts the forward until dropped) or NoBackendAvailable
//! ```
//!
//! # Design Decisions
//! - Selection state lives in the selector and is updated atomically
//! - Algorithm selection per backend, resolved once at assembly time
//! - Unhealthy servers excluded from selection

pub mod least_conn;
pub mod random;
pub mod round_robin;
pub mod server;

use std::fmt::Debug;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use crate::config::ServerConfig;

pub use server::{HealthState, Server, ServerGuard};

/// Picks one server out of an ordered list.
pub trait Selector: Send + Sync + Debug {
    /// Returns the next healthy server, or `None` if there is none.
    fn next_server(&self, servers: &[Arc<Server>]) -> Option<Arc<Server>>;
}

/// Builds a fresh selector for one backend.
pub type SelectorFactory = Arc<dyn Fn() -> Box<dyn Selector> + Send + Sync>;

pub const ROUND_ROBIN: &str = "round-robin";
pub const LEAST_CONNECTIONS: &str = "least-connections";
pub const RANDOM: &str = "random";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadBalancerError {
    #[error("unknown load balancer algorithm '{algorithm}' for backend '{backend}'")]
    UnknownAlgorithm { algorithm: String, backend: String },
}

/// No healthy server could be selected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no backend available for '{backend}'")]
pub struct NoBackendAvailable {
    pub backend: String,
}

/// Selects one healthy server of a backend under a selection algorithm.
#[derive(Debug)]
pub struct LoadBalancer {
    backend: String,
    algorithm: String,
    servers: Vec<Arc<Server>>,
    selector: Box<dyn Selector>,
}

impl LoadBalancer {
    pub fn new(
        backend: impl Into<String>,
        algorithm: impl Into<String>,
        servers: Vec<Arc<Server>>,
        selector: Box<dyn Selector>,
    ) -> Self {
        Self {
            backend: backend.into(),
            algorithm: algorithm.into(),
            servers,
            selector,
        }
    }

    /// Select a server. The returned guard counts the forward as in flight.
    pub fn select(&self) -> Result<ServerGuard, NoBackendAvailable> {
        match self.selector.next_server(&self.servers) {
            Some(server) => Ok(server.connection_guard()),
            None => {
                tracing::debug!(
                    backend = %self.backend,
                    server_count = self.servers.len(),
                    "No healthy servers found in backend"
                );
                Err(NoBackendAvailable {
                    backend: self.backend.clone(),
                })
            }
        }
    }

    pub fn backend_name(&self) -> &str {
        &self.backend
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// All servers, for health checking and diagnostics.
    pub fn servers(&self) -> &[Arc<Server>] {
        &self.servers
    }
}

/// Algorithm name → selector factory.
#[derive(Clone)]
pub struct AlgorithmRegistry {
    factories: Arc<DashMap<String, SelectorFactory>>,
}

impl Debug for AlgorithmRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        names.sort();
        f.debug_struct("AlgorithmRegistry").field("algorithms", &names).finish()
    }
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl AlgorithmRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            factories: Arc::new(DashMap::new()),
        }
    }

    /// A registry holding round-robin, least-connections and random.
    pub fn with_builtins() -> Self {
        let registry = Self::empty();
        registry.register(ROUND_ROBIN, selector_factory::<round_robin::RoundRobin>());
        registry.register(LEAST_CONNECTIONS, selector_factory::<least_conn::LeastConnections>());
        registry.register(RANDOM, selector_factory::<random::Random>());
        registry
    }

    /// Add or replace an algorithm. Returns true if the name was new.
    pub fn register(&self, name: impl Into<String>, factory: SelectorFactory) -> bool {
        self.factories.insert(name.into(), factory).is_none()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(resolve_name(name))
    }

    /// Build a load balancer for `backend` over `servers`.
    ///
    /// An empty algorithm name means round-robin.
    pub fn instantiate(
        &self,
        algorithm: &str,
        backend: &str,
        servers: &[ServerConfig],
    ) -> Result<LoadBalancer, LoadBalancerError> {
        let servers = servers
            .iter()
            .cloned()
            .map(|config| Arc::new(Server::new(config)))
            .collect();
        self.build(algorithm, backend, servers)
    }

    /// Like [`instantiate`](Self::instantiate), over existing runtime servers.
    ///
    /// Servers shared between backends share their health state.
    pub fn build(
        &self,
        algorithm: &str,
        backend: &str,
        servers: Vec<Arc<Server>>,
    ) -> Result<LoadBalancer, LoadBalancerError> {
        let name = resolve_name(algorithm);
        let factory = self
            .factories
            .get(name)
            .map(|f| f.value().clone())
            .ok_or_else(|| LoadBalancerError::UnknownAlgorithm {
                algorithm: algorithm.to_string(),
                backend: backend.to_string(),
            })?;
        Ok(LoadBalancer::new(backend, name, servers, factory()))
    }
}

/// Factory for any selector that starts from its default state.
pub fn selector_factory<S>() -> SelectorFactory
where
    S: Selector + Default + 'static,
{
    Arc::new(|| Box::new(S::default()) as Box<dyn Selector>)
}

fn resolve_name(algorithm: &str) -> &str {
    if algorithm.is_empty() {
        ROUND_ROBIN
    } else {
        algorithm
    }
}

/// Instantiate with the built-in algorithms only.
pub fn instantiate(
    algorithm: &str,
    backend: &str,
    servers: &[ServerConfig],
) -> Result<LoadBalancer, LoadBalancerError> {
    static BUILTINS: OnceLock<AlgorithmRegistry> = OnceLock::new();
    BUILTINS
        .get_or_init(AlgorithmRegistry::with_builtins)
        .instantiate(algorithm, backend, servers)
}
