//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route assembly (at startup and on reload):
//!     GatewayConfig + ListenerConfig
//!     → model.rs (ManagedService: routes → backends → load balancers)
//!     → assembler.rs (group by URI, guard + handler per route, collapse)
//!     → table.rs (DispatchTable, longest URI root first)
//!
//! Incoming Request (path, method, headers)
//!     → DispatchTable::lookup (URI root)
//!     → matcher.rs (guards, first match in declaration order)
//!     → route handler (single backend or multi-backend adapter)
//! ```
//!
//! # Design Decisions
//! - Tables built once, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route
//! - Plugin names resolved at assembly time; unknown names abort assembly

pub mod assembler;
pub mod matcher;
pub mod model;
pub mod table;

pub use assembler::{Assembler, AssemblyError, GuardAndHandler};
pub use matcher::{from_guard_config, AlwaysMatch, Matcher};
pub use model::{Backend, ManagedService, Route, ServerPool};
pub use table::DispatchTable;
