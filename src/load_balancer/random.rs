//! Uniform random load balancing strategy.

use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::load_balancer::{server::Server, Selector};

#[derive(Debug, Default)]
pub struct Random;

impl Selector for Random {
    fn next_server(&self, servers: &[Arc<Server>]) -> Option<Arc<Server>> {
        let healthy: Vec<&Arc<Server>> = servers.iter().filter(|s| s.is_healthy()).collect();
        healthy.choose(&mut rand::thread_rng()).map(|s| Arc::clone(s))
    }
}
