//! Plugin registry.
//!
//! Populated during bootstrap, then frozen before any listener starts.
//! Lookups happen once per route at assembly time, never per request.

use std::sync::RwLock;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::load_balancer::{AlgorithmRegistry, SelectorFactory};
use crate::plugin::adapter::MultiBackendAdapterFactory;
use crate::plugin::wrapper::WrapperFactory;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("plugin registry is frozen; cannot register {kind} '{name}'")]
    Frozen { kind: &'static str, name: String },

    #[error("{kind} '{name}' is already registered")]
    DuplicateName { kind: &'static str, name: String },
}

/// Named wrapper factories, multi-backend adapter factories and load
/// balancing algorithms.
pub struct PluginRegistry {
    wrappers: DashMap<String, WrapperFactory>,
    adapters: DashMap<String, MultiBackendAdapterFactory>,
    algorithms: AlgorithmRegistry,
    /// Registration holds the read side; `freeze` takes the write side.
    frozen: RwLock<bool>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("wrappers", &self.wrapper_names())
            .field("adapters", &self.adapter_names())
            .field("algorithms", &self.algorithms)
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRegistry {
    /// A registry with the built-in load balancing algorithms and no plugins.
    pub fn new() -> Self {
        Self {
            wrappers: DashMap::new(),
            adapters: DashMap::new(),
            algorithms: AlgorithmRegistry::with_builtins(),
            frozen: RwLock::new(false),
        }
    }

    fn register<F>(
        &self,
        kind: &'static str,
        name: String,
        insert: F,
    ) -> Result<(), RegistryError>
    where
        F: FnOnce(String) -> bool,
    {
        let frozen = self.frozen.read().unwrap_or_else(|e| e.into_inner());
        if *frozen {
            return Err(RegistryError::Frozen { kind, name });
        }
        if !insert(name.clone()) {
            return Err(RegistryError::DuplicateName { kind, name });
        }
        tracing::debug!(kind, name = %name, "Plugin registered");
        Ok(())
    }

    pub fn register_wrapper_factory(
        &self,
        name: impl Into<String>,
        factory: WrapperFactory,
    ) -> Result<(), RegistryError> {
        self.register("wrapper", name.into(), |name| {
            match self.wrappers.entry(name) {
                Entry::Occupied(_) => false,
                Entry::Vacant(slot) => {
                    slot.insert(factory);
                    true
                }
            }
        })
    }

    pub fn register_multi_backend_adapter_factory(
        &self,
        name: impl Into<String>,
        factory: MultiBackendAdapterFactory,
    ) -> Result<(), RegistryError> {
        self.register("multi-backend adapter", name.into(), |name| {
            match self.adapters.entry(name) {
                Entry::Occupied(_) => false,
                Entry::Vacant(slot) => {
                    slot.insert(factory);
                    true
                }
            }
        })
    }

    pub fn register_load_balancer(
        &self,
        name: impl Into<String>,
        factory: SelectorFactory,
    ) -> Result<(), RegistryError> {
        self.register("load balancer", name.into(), |name| {
            if self.algorithms.contains(&name) {
                return false;
            }
            self.algorithms.register(name, factory)
        })
    }

    /// End the registration phase. Later registrations fail with `Frozen`.
    pub fn freeze(&self) {
        let mut frozen = self.frozen.write().unwrap_or_else(|e| e.into_inner());
        *frozen = true;
        tracing::info!(
            wrappers = ?self.wrapper_names(),
            adapters = ?self.adapter_names(),
            "Plugin registry frozen"
        );
    }

    pub fn is_frozen(&self) -> bool {
        *self.frozen.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn contains_wrapper(&self, name: &str) -> bool {
        self.wrappers.contains_key(name)
    }

    pub fn contains_adapter(&self, name: &str) -> bool {
        self.adapters.contains_key(name)
    }

    pub fn wrapper_factory(&self, name: &str) -> Option<WrapperFactory> {
        self.wrappers.get(name).map(|f| f.value().clone())
    }

    pub fn adapter_factory(&self, name: &str) -> Option<MultiBackendAdapterFactory> {
        self.adapters.get(name).map(|f| f.value().clone())
    }

    pub fn algorithms(&self) -> &AlgorithmRegistry {
        &self.algorithms
    }

    pub fn wrapper_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.wrappers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn adapter_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::load_balancer::{round_robin::RoundRobin, selector_factory};
    use crate::plugin::adapter::{BufferedRequest, BackendHandlerMap, MultiBackendAdapter};
    use crate::plugin::handler::SharedHandler;
    use crate::plugin::wrapper::Wrapper;

    use axum::body::Body;
    use axum::http::Response;

    struct Passthrough;

    impl Wrapper for Passthrough {
        fn wrap(&self, inner: SharedHandler) -> SharedHandler {
            inner
        }
    }

    fn passthrough_factory() -> WrapperFactory {
        Arc::new(|| Arc::new(Passthrough) as Arc<dyn Wrapper>)
    }

    fn fixed_adapter_factory() -> MultiBackendAdapterFactory {
        Arc::new(|map: BackendHandlerMap| {
            MultiBackendAdapter::new(map, |_: BackendHandlerMap, _: BufferedRequest| async {
                Response::new(Body::from("fixed"))
            })
        })
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = PluginRegistry::new();
        registry
            .register_wrapper_factory("passthrough", passthrough_factory())
            .unwrap();
        registry
            .register_multi_backend_adapter_factory("fixed", fixed_adapter_factory())
            .unwrap();

        assert!(registry.contains_wrapper("passthrough"));
        assert!(registry.contains_adapter("fixed"));
        assert!(registry.wrapper_factory("missing").is_none());
        assert_eq!(registry.wrapper_names(), vec!["passthrough".to_string()]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let registry = PluginRegistry::new();
        registry
            .register_wrapper_factory("passthrough", passthrough_factory())
            .unwrap();
        assert_eq!(
            registry.register_wrapper_factory("passthrough", passthrough_factory()),
            Err(RegistryError::DuplicateName {
                kind: "wrapper",
                name: "passthrough".into()
            })
        );
        assert!(matches!(
            registry.register_load_balancer("round-robin", selector_factory::<RoundRobin>()),
            Err(RegistryError::DuplicateName { .. })
        ));
    }

    #[test]
    fn test_frozen_registry_rejects_registration() {
        let registry = PluginRegistry::new();
        registry.freeze();
        assert!(registry.is_frozen());
        assert_eq!(
            registry.register_multi_backend_adapter_factory("fixed", fixed_adapter_factory()),
            Err(RegistryError::Frozen {
                kind: "multi-backend adapter",
                name: "fixed".into()
            })
        );
        assert!(!registry.contains_adapter("fixed"));
    }

    #[test]
    fn test_custom_load_balancer() {
        let registry = PluginRegistry::new();
        registry
            .register_load_balancer("sticky-first", selector_factory::<RoundRobin>())
            .unwrap();
        assert!(registry.algorithms().contains("sticky-first"));
    }
}
