//! Runtime server state.
//!
//! # Responsibilities
//! - Represent a single configured backend endpoint
//! - Track in-flight forwards (for Least Connections LB)
//! - Track health state (Unknown/Healthy/Unhealthy) with hysteresis

use std::ops::Deref;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::ServerConfig;

/// Health State enum.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl From<u8> for HealthState {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthState::Healthy,
            2 => HealthState::Unhealthy,
            _ => HealthState::Unknown,
        }
    }
}

/// A single backend server.
#[derive(Debug)]
pub struct Server {
    /// Static description this server was built from.
    pub config: ServerConfig,
    /// Number of forwards currently in flight.
    active_connections: AtomicUsize,
    /// Current health state (0=Unknown, 1=Healthy, 2=Unhealthy).
    state: AtomicU8,
    consecutive_failures: AtomicUsize,
    consecutive_successes: AtomicUsize,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            active_connections: AtomicUsize::new(0),
            state: AtomicU8::new(HealthState::Unknown as u8),
            consecutive_failures: AtomicUsize::new(0),
            consecutive_successes: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// `address:port` of this server.
    pub fn authority(&self) -> String {
        self.config.authority()
    }

    /// Get the current number of in-flight forwards.
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Create a guard that counts one in-flight forward until dropped.
    pub fn connection_guard(self: &Arc<Self>) -> ServerGuard {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        ServerGuard {
            server: self.clone(),
        }
    }

    // --- Health Logic ---

    pub fn health(&self) -> HealthState {
        HealthState::from(self.state.load(Ordering::Relaxed))
    }

    /// Return true if server is considered available (Healthy or Unknown).
    pub fn is_healthy(&self) -> bool {
        self.health() != HealthState::Unhealthy
    }

    /// Force the server into the healthy state.
    pub fn mark_up(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.state.store(HealthState::Healthy as u8, Ordering::Relaxed);
    }

    /// Force the server out of rotation.
    pub fn mark_down(&self) {
        self.consecutive_successes.store(0, Ordering::Relaxed);
        self.state.store(HealthState::Unhealthy as u8, Ordering::Relaxed);
    }

    /// Report a successful check. Returns true on a transition to Healthy.
    pub fn mark_success(&self, healthy_threshold: usize) -> bool {
        self.consecutive_failures.store(0, Ordering::Relaxed);

        if self.health() == HealthState::Healthy {
            return false;
        }

        let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
        if successes >= healthy_threshold {
            self.consecutive_successes.store(0, Ordering::Relaxed);
            self.state.store(HealthState::Healthy as u8, Ordering::Relaxed);
            return true;
        }
        false
    }

    /// Report a failed check. Returns true on a transition to Unhealthy.
    pub fn mark_failure(&self, unhealthy_threshold: usize) -> bool {
        self.consecutive_successes.store(0, Ordering::Relaxed);

        if self.health() == HealthState::Unhealthy {
            return false;
        }

        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= unhealthy_threshold {
            self.consecutive_failures.store(0, Ordering::Relaxed);
            self.state.store(HealthState::Unhealthy as u8, Ordering::Relaxed);
            return true;
        }
        false
    }
}

/// A RAII guard that manages the in-flight count of a selected server.
#[derive(Debug)]
pub struct ServerGuard {
    server: Arc<Server>,
}

impl ServerGuard {
    pub fn server(&self) -> &Arc<Server> {
        &self.server
    }
}

impl Deref for ServerGuard {
    type Target = Server;
    fn deref(&self) -> &Self::Target {
        &self.server
    }
}

impl Drop for ServerGuard {
    fn drop(&mut self) {
        self.server.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}
