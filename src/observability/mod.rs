//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields
//!     → logging.rs (subscriber, level from GATEWAY_LOGGING_LEVEL / RUST_LOG)
//!
//! Listeners add:
//!     → x-request-id (generated when absent, echoed on the response)
//!     → TraceLayer spans per request
//!
//! On demand (GATEWAY_DIAGNOSTICS_ENDPOINT):
//!     → diagnostics.rs (/debug/status, /debug/backends, /debug/routes)
//! ```
//!
//! # Design Decisions
//! - Request ID flows from the listener to every backend call
//! - Diagnostics are read-only views of the live dispatch tables

pub mod diagnostics;
pub mod logging;

pub use diagnostics::{fire_up_diagnostics, fire_up_diagnostics_at, Diagnostics};
pub use logging::{init_logging, log_level_from_env, parse_log_level};
