//! Route assembly: managed service → dispatch table.
//!
//! # Data Flow
//! ```text
//! ManagedService
//!     → organize_routes_by_uri (URI root → routes, declaration order)
//!     → map_routes_to_guard_and_handler (guard + single/multi handler + route wrappers)
//!     → make_uri_handler (collapse guarded entries; first match wins)
//!     → listener wrappers
//!     → DispatchTable
//! ```
//!
//! Plugins are resolved by name here, once, never on the request path.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use futures_util::future::BoxFuture;

use crate::http::forward::Forwarder;
use crate::http::handlers::{BackendHandler, MultiBackendRouteHandler};
use crate::http::response::GatewayFailure;
use crate::load_balancer::LoadBalancerError;
use crate::plugin::{apply_wrappers, BackendHandlerMap, Handler, PluginRegistry, SharedHandler, Wrapper};
use crate::routing::matcher::{from_guard_config, GuardError, Matcher};
use crate::routing::model::{ManagedService, Route};
use crate::routing::table::DispatchTable;

#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error(transparent)]
    UnknownAlgorithm(#[from] LoadBalancerError),

    #[error("route '{route}' references unregistered multi-backend adapter '{adapter}'")]
    UnregisteredAdapter { route: String, adapter: String },

    #[error("{owner} references unregistered wrapper '{wrapper}'")]
    UnregisteredWrapper { owner: String, wrapper: String },

    #[error("route '{route}' has no backends")]
    NoBackends { route: String },

    #[error("route '{route}' has {count} backends but no multi-backend adapter")]
    BackendCount { route: String, count: usize },

    #[error("route '{route}' lists backend '{backend}' more than once")]
    DuplicateBackend { route: String, backend: String },

    #[error("route '{route}' references unknown backend '{backend}'")]
    UnknownBackend { route: String, backend: String },

    #[error("backend '{backend}' references unknown server '{server}'")]
    UnknownServer { backend: String, server: String },

    #[error("listener '{listener}' references unknown route '{route}'")]
    UnknownRoute { listener: String, route: String },

    #[error("route '{route}' has an invalid guard: {source}")]
    InvalidGuard {
        route: String,
        #[source]
        source: GuardError,
    },
}

/// One route's applicability test and its (wrapped) handler.
#[derive(Clone)]
pub struct GuardAndHandler {
    pub route: String,
    pub guard: Arc<dyn Matcher>,
    pub handler: SharedHandler,
}

impl std::fmt::Debug for GuardAndHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardAndHandler")
            .field("route", &self.route)
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}

/// Evaluates guards in declaration order and runs the first match.
struct GuardedHandler {
    uri: String,
    entries: Arc<Vec<GuardAndHandler>>,
}

impl Handler for GuardedHandler {
    fn call(&self, request: Request<Body>) -> BoxFuture<'static, Response<Body>> {
        let selected = self
            .entries
            .iter()
            .find(|entry| entry.guard.matches(&request))
            .map(|entry| entry.handler.clone());

        match selected {
            Some(handler) => handler.call(request),
            None => {
                tracing::debug!(
                    uri = %self.uri,
                    method = %request.method(),
                    "No route applies to request"
                );
                Box::pin(async { GatewayFailure::NoRouteApplies.into_response() })
            }
        }
    }
}

/// Builds dispatch tables from managed services.
#[derive(Clone)]
pub struct Assembler {
    registry: Arc<PluginRegistry>,
    forwarder: Arc<Forwarder>,
}

impl Assembler {
    pub fn new(registry: Arc<PluginRegistry>, forwarder: Arc<Forwarder>) -> Self {
        Self {
            registry,
            forwarder,
        }
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Entry for a route served by exactly one backend.
    pub fn make_single_backend_entry(&self, route: &Route) -> Result<GuardAndHandler, AssemblyError> {
        let backend = match route.backends.as_slice() {
            [backend] => backend,
            [] => {
                return Err(AssemblyError::NoBackends {
                    route: route.name.clone(),
                })
            }
            backends => {
                return Err(AssemblyError::BackendCount {
                    route: route.name.clone(),
                    count: backends.len(),
                })
            }
        };

        let handler: SharedHandler = Arc::new(BackendHandler::new(
            backend.load_balancer.clone(),
            self.forwarder.clone(),
        ));
        self.finish_entry(route, handler)
    }

    /// Entry for a route whose backends are composed by a named adapter.
    pub fn make_multi_backend_entry(
        &self,
        route: &Route,
        adapter: &str,
    ) -> Result<GuardAndHandler, AssemblyError> {
        if route.backends.is_empty() {
            return Err(AssemblyError::NoBackends {
                route: route.name.clone(),
            });
        }
        let factory = self
            .registry
            .adapter_factory(adapter)
            .ok_or_else(|| AssemblyError::UnregisteredAdapter {
                route: route.name.clone(),
                adapter: adapter.to_string(),
            })?;

        let mut handlers: BTreeMap<String, SharedHandler> = BTreeMap::new();
        for backend in &route.backends {
            let handler: SharedHandler = Arc::new(BackendHandler::new(
                backend.load_balancer.clone(),
                self.forwarder.clone(),
            ));
            if handlers.insert(backend.name.clone(), handler).is_some() {
                return Err(AssemblyError::DuplicateBackend {
                    route: route.name.clone(),
                    backend: backend.name.clone(),
                });
            }
        }

        let adapter = factory(BackendHandlerMap::new(handlers));
        let handler: SharedHandler = Arc::new(MultiBackendRouteHandler::new(
            route.name.clone(),
            adapter,
            self.forwarder.max_body_bytes(),
        ));
        self.finish_entry(route, handler)
    }

    fn finish_entry(&self, route: &Route, handler: SharedHandler) -> Result<GuardAndHandler, AssemblyError> {
        let guard = from_guard_config(route.guard.as_ref()).map_err(|source| {
            AssemblyError::InvalidGuard {
                route: route.name.clone(),
                source,
            }
        })?;
        let wrappers = self.wrappers(&format!("route '{}'", route.name), &route.plugins)?;
        Ok(GuardAndHandler {
            route: route.name.clone(),
            guard,
            handler: apply_wrappers(handler, &wrappers),
        })
    }

    /// One entry per route, in the given order.
    pub fn map_routes_to_guard_and_handler(
        &self,
        routes: &[&Route],
    ) -> Result<Vec<GuardAndHandler>, AssemblyError> {
        routes
            .iter()
            .map(|route| match &route.multi_backend_plugin_name {
                Some(adapter) => self.make_multi_backend_entry(route, adapter),
                None => self.make_single_backend_entry(route),
            })
            .collect()
    }

    /// Collapse a URI's entries into one handler.
    ///
    /// A single always-matching entry is used as is.
    pub fn make_uri_handler(&self, uri: &str, mut entries: Vec<GuardAndHandler>) -> SharedHandler {
        if entries.len() == 1 && entries[0].guard.always() {
            if let Some(entry) = entries.pop() {
                return entry.handler;
            }
        }
        Arc::new(GuardedHandler {
            uri: uri.to_string(),
            entries: Arc::new(entries),
        })
    }

    /// URI root → handler, listener wrappers applied.
    pub fn make_uri_handler_map(
        &self,
        service: &ManagedService,
    ) -> Result<Vec<(String, SharedHandler)>, AssemblyError> {
        let listener_wrappers =
            self.wrappers(&format!("listener '{}'", service.listener_name), &service.plugins)?;

        service
            .organize_routes_by_uri()
            .into_iter()
            .map(|(uri, routes)| {
                let entries = self.map_routes_to_guard_and_handler(&routes)?;
                tracing::debug!(
                    listener = %service.listener_name,
                    uri = %uri,
                    routes = entries.len(),
                    "Assembled URI handler"
                );
                let handler = self.make_uri_handler(&uri, entries);
                Ok((uri, apply_wrappers(handler, &listener_wrappers)))
            })
            .collect()
    }

    /// Build the dispatch table of one managed service.
    pub fn assemble(&self, service: Arc<ManagedService>) -> Result<DispatchTable, AssemblyError> {
        let entries = self.make_uri_handler_map(&service)?;
        Ok(DispatchTable::new(service, entries))
    }

    fn wrappers(&self, owner: &str, names: &[String]) -> Result<Vec<Arc<dyn Wrapper>>, AssemblyError> {
        names
            .iter()
            .map(|name| {
                self.registry
                    .wrapper_factory(name)
                    .map(|factory| factory())
                    .ok_or_else(|| AssemblyError::UnregisteredWrapper {
                        owner: owner.to_string(),
                        wrapper: name.clone(),
                    })
            })
            .collect()
    }
}
