//! Plugin subsystem: the handler contract and its two extension points.
//!
//! # Data Flow
//! ```text
//! Bootstrap:
//!     register_wrapper_factory / register_multi_backend_adapter_factory
//!     → PluginRegistry (name → factory)
//!     → freeze() before listeners start
//!
//! Route assembly:
//!     route.plugins      → wrapper factories → apply_wrappers (outermost first)
//!     route.adapter name → adapter factory(BackendHandlerMap) → MultiBackendAdapter
//!
//! Per request (multi-backend route):
//!     BufferedRequest → adapter.handler.compose(backend handlers, request)
//! ```

pub mod adapter;
pub mod builtin;
pub mod handler;
pub mod registry;
pub mod wrapper;

pub use adapter::{
    BackendHandlerMap, BufferedRequest, Compose, MultiBackendAdapter, MultiBackendAdapterFactory,
    MultiBackendHandler,
};
pub use builtin::register_builtin_plugins;
pub use handler::{handler_fn, Handler, SharedHandler};
pub use registry::{PluginRegistry, RegistryError};
pub use wrapper::{apply_wrappers, Wrapper, WrapperFactory};
