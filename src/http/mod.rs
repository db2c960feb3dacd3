//! HTTP subsystem: listener serving and outbound forwarding.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum, request ID, tracing)
//!     → DispatchTable (routing layer picks the URI handler)
//!     → handlers.rs:
//!         - BackendHandler: load balancer select() → forward.rs
//!         - MultiBackendRouteHandler: buffer body → adapter composition
//!     → forward.rs (proxy_env.rs resolves the proxy per call, reqwest sends)
//!     → response.rs (gateway failures, hop-by-hop stripping)
//!     → Send to client
//! ```

pub mod body;
pub mod forward;
pub mod handlers;
pub mod proxy_env;
pub mod response;
pub mod server;

pub use body::{read_limited, BodyError};
pub use forward::{ForwardError, Forwarder};
pub use handlers::{BackendHandler, MultiBackendRouteHandler};
pub use proxy_env::{InvalidProxyUrl, OutboundProxy, ProxySettings};
pub use response::{GatewayFailure, X_GATEWAY_ERROR};
pub use server::{router, BoundGateway, Gateway};
