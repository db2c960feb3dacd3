//! Runtime routing model.
//!
//! Built from the declarative configuration: a `ManagedService` owns its
//! routes, a `Route` owns its backends, a `Backend` owns its load balancer.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{GatewayConfig, GuardConfig, ListenerConfig};
use crate::load_balancer::{AlgorithmRegistry, LoadBalancer, Server};
use crate::routing::assembler::AssemblyError;

/// A named group of equivalent servers behind one load balancer.
#[derive(Debug, Clone)]
pub struct Backend {
    pub name: String,
    pub load_balancer: Arc<LoadBalancer>,
}

/// A URI root bound to one or more backends.
#[derive(Debug, Clone)]
pub struct Route {
    pub name: String,
    pub uri_root: String,
    pub backends: Vec<Backend>,
    /// Wrapper names, outermost first.
    pub plugins: Vec<String>,
    /// When set, requests go through this multi-backend adapter.
    pub multi_backend_plugin_name: Option<String>,
    pub guard: Option<GuardConfig>,
}

/// A listener plus its ordered routes.
#[derive(Debug, Clone)]
pub struct ManagedService {
    pub listener_name: String,
    pub address: String,
    pub routes: Vec<Route>,
    /// Wrapper names applied to every route, outside the route's own.
    pub plugins: Vec<String>,
}

/// Runtime servers keyed by name, so every backend naming a server shares
/// one health state and one in-flight counter.
#[derive(Debug, Default)]
pub struct ServerPool {
    servers: HashMap<String, Arc<Server>>,
}

impl ServerPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_or_create(&mut self, config: &crate::config::ServerConfig) -> Arc<Server> {
        self.servers
            .entry(config.name.clone())
            .or_insert_with(|| Arc::new(Server::new(config.clone())))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

impl ManagedService {
    /// Resolve a listener definition into runtime routes and backends.
    pub fn from_config(
        config: &GatewayConfig,
        listener: &ListenerConfig,
        algorithms: &AlgorithmRegistry,
        pool: &mut ServerPool,
    ) -> Result<Self, AssemblyError> {
        let mut routes = Vec::with_capacity(listener.routes.len());

        for route_name in &listener.routes {
            let route = config
                .route(route_name)
                .ok_or_else(|| AssemblyError::UnknownRoute {
                    listener: listener.name.clone(),
                    route: route_name.clone(),
                })?;

            if route.backends.is_empty() {
                return Err(AssemblyError::NoBackends {
                    route: route.name.clone(),
                });
            }

            let mut backends = Vec::with_capacity(route.backends.len());
            for backend_name in &route.backends {
                let backend = config
                    .backend(backend_name)
                    .ok_or_else(|| AssemblyError::UnknownBackend {
                        route: route.name.clone(),
                        backend: backend_name.clone(),
                    })?;

                let servers = backend
                    .servers
                    .iter()
                    .map(|server_name| {
                        config
                            .server(server_name)
                            .map(|server| pool.get_or_create(server))
                            .ok_or_else(|| AssemblyError::UnknownServer {
                                backend: backend.name.clone(),
                                server: server_name.clone(),
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                let load_balancer =
                    algorithms.build(&backend.load_balancer_policy, &backend.name, servers)?;
                backends.push(Backend {
                    name: backend.name.clone(),
                    load_balancer: Arc::new(load_balancer),
                });
            }

            routes.push(Route {
                name: route.name.clone(),
                uri_root: route.uri_root.clone(),
                backends,
                plugins: route.plugins.clone(),
                multi_backend_plugin_name: route.multi_backend_adapter.clone(),
                guard: route.guard.clone(),
            });
        }

        Ok(Self {
            listener_name: listener.name.clone(),
            address: listener.address.clone(),
            routes,
            plugins: listener.plugins.clone(),
        })
    }

    /// Group routes by URI root.
    ///
    /// Groups appear in order of first declaration; routes within a group
    /// keep declaration order, which is their guard priority.
    pub fn organize_routes_by_uri(&self) -> Vec<(String, Vec<&Route>)> {
        let mut groups: Vec<(String, Vec<&Route>)> = Vec::new();
        for route in &self.routes {
            match groups.iter_mut().find(|(uri, _)| *uri == route.uri_root) {
                Some((_, routes)) => routes.push(route),
                None => groups.push((route.uri_root.clone(), vec![route])),
            }
        }
        groups
    }

    /// Every load balancer of every route.
    pub fn load_balancers(&self) -> impl Iterator<Item = &Arc<LoadBalancer>> {
        self.routes
            .iter()
            .flat_map(|r| r.backends.iter())
            .map(|b| &b.load_balancer)
    }
}
