//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::load_balancer::{server::Server, Selector};

/// Round-robin selector.
/// Stores an internal counter to rotate through servers.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Selector for RoundRobin {
    fn next_server(&self, servers: &[Arc<Server>]) -> Option<Arc<Server>> {
        if servers.is_empty() {
            return None;
        }

        // Bounded scan so an all-unhealthy list terminates.
        let start_count = self.counter.fetch_add(1, Ordering::Relaxed);
        let len = servers.len();

        for i in 0..len {
            let index = start_count.wrapping_add(i) % len;
            let server = &servers[index];
            if server.is_healthy() {
                return Some(server.clone());
            }
        }
        None
    }
}
