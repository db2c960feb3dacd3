//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs), only when enabled:
//!     Periodic timer
//!     → Collect servers from the live dispatch tables
//!     → GET http://address:port<ping_uri>
//!     → Server::mark_success / mark_failure
//!
//! State machine (load_balancer/server.rs):
//!     Unknown → Healthy ←→ Unhealthy
//!     With thresholds to prevent flapping
//! ```
//!
//! # Design Decisions
//! - Opt-in; without it the ping path is advisory and every server stays available
//! - State transitions require consecutive successes/failures
//! - Health state is per server, shared by every backend naming it

pub mod active;

pub use active::HealthMonitor;
