//! Least Connections load balancing strategy.

use std::sync::Arc;

use crate::load_balancer::{server::Server, Selector};

/// Least connections selector.
/// Selects the healthy server with the fewest in-flight forwards.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl Selector for LeastConnections {
    fn next_server(&self, servers: &[Arc<Server>]) -> Option<Arc<Server>> {
        // In case of tie, the first one is selected (stability)
        servers
            .iter()
            .filter(|s| s.is_healthy())
            .min_by_key(|s| s.active_connections())
            .cloned()
    }
}
