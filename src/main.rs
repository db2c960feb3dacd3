//! API Gateway
//!
//! Accepts requests on the configured listeners and dispatches each to the
//! backends of the matching route.
//!
//! # Architecture Overview
//!
//! ```text
//!     GATEWAY_KVSTORE_URL ──▶ kvstore ──▶ config (load + validate)
//!                                              │
//!     plugin registry (frozen) ────────────────┤
//!                                              ▼
//!                                   routing::Assembler
//!                                   (one DispatchTable per listener)
//!                                              │
//!     Client Request ──▶ listener ──▶ DispatchTable ──▶ guard ──▶ route handler
//!                                                                     │
//!                        single backend: load balancer ──▶ forwarder ─┤
//!                        multi backend: adapter composition ──────────┤
//!                                                                     ▼
//!     Client Response ◀──────────────────────────────────────── backend server(s)
//! ```

use api_gateway::config::{load_config, watcher::ConfigWatcher};
use api_gateway::http::Gateway;
use api_gateway::lifecycle::{self, signals, Shutdown};
use api_gateway::observability::{self, Diagnostics};
use api_gateway::plugin::register_builtin_plugins;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    observability::init_logging(observability::log_level_from_env());

    tracing::info!("api-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    let environment = lifecycle::setup_environment(register_builtin_plugins)?;

    let config = load_config(environment.store.as_ref())?;
    tracing::info!(
        servers = config.servers.len(),
        backends = config.backends.len(),
        routes = config.routes.len(),
        listeners = config.listeners.len(),
        "Configuration loaded"
    );

    let gateway = Gateway::build(&config, environment.registry.clone())?;

    if observability::fire_up_diagnostics(Diagnostics::new(gateway.tables())) {
        tracing::info!("Diagnostics endpoint enabled");
    }

    // The watcher must outlive the gateway for reloads to keep flowing.
    let (_watcher, updates) = if config.settings.reload {
        let (watcher, updates) = ConfigWatcher::new(environment.store.clone());
        match watcher.run()? {
            Some(watcher) => (Some(watcher), Some(updates)),
            None => (None, None),
        }
    } else {
        (None, None)
    };

    let shutdown = Shutdown::new();
    tokio::spawn(signals::shutdown_on_signal(shutdown.clone()));

    gateway.run(&shutdown, updates).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
