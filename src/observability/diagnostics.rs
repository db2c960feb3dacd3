//! Diagnostics listener.
//!
//! Started only when `GATEWAY_DIAGNOSTICS_ENDPOINT` names an address.
//! Binding happens in the spawned task; failure to bind is logged, never fatal.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;

use crate::config::env;
use crate::load_balancer::HealthState;
use crate::routing::DispatchTable;

/// Read-only view of the gateway for the diagnostics routes.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    started: Instant,
    tables: Vec<Arc<ArcSwap<DispatchTable>>>,
}

impl Diagnostics {
    pub fn new(tables: Vec<Arc<ArcSwap<DispatchTable>>>) -> Self {
        Self {
            started: Instant::now(),
            tables,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct ServerStatus {
    pub name: String,
    pub address: String,
    pub health: HealthState,
    pub active_connections: usize,
}

#[derive(Debug, Serialize)]
pub struct BackendStatus {
    pub name: String,
    pub algorithm: String,
    pub servers: Vec<ServerStatus>,
}

#[derive(Debug, Serialize)]
pub struct ListenerRoutes {
    pub listener: String,
    pub address: String,
    pub uris: Vec<String>,
}

pub async fn get_status(State(diagnostics): State<Diagnostics>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: diagnostics.started.elapsed().as_secs(),
    })
}

pub async fn get_backends(State(diagnostics): State<Diagnostics>) -> Json<Vec<BackendStatus>> {
    let mut seen = HashSet::new();
    let mut statuses = Vec::new();

    for table in &diagnostics.tables {
        let table = table.load_full();
        for lb in table.service().load_balancers() {
            if !seen.insert(lb.backend_name().to_string()) {
                continue;
            }
            statuses.push(BackendStatus {
                name: lb.backend_name().to_string(),
                algorithm: lb.algorithm().to_string(),
                servers: lb
                    .servers()
                    .iter()
                    .map(|s| ServerStatus {
                        name: s.name().to_string(),
                        address: s.authority(),
                        health: s.health(),
                        active_connections: s.active_connections(),
                    })
                    .collect(),
            });
        }
    }

    Json(statuses)
}

pub async fn get_routes(State(diagnostics): State<Diagnostics>) -> Json<Vec<ListenerRoutes>> {
    Json(
        diagnostics
            .tables
            .iter()
            .map(|table| {
                let table = table.load_full();
                ListenerRoutes {
                    listener: table.listener().to_string(),
                    address: table.service().address.clone(),
                    uris: table.uris().into_iter().map(str::to_string).collect(),
                }
            })
            .collect(),
    )
}

pub fn router(diagnostics: Diagnostics) -> Router {
    Router::new()
        .route("/debug/status", get(get_status))
        .route("/debug/backends", get(get_backends))
        .route("/debug/routes", get(get_routes))
        .with_state(diagnostics)
}

/// Start the diagnostics listener if `GATEWAY_DIAGNOSTICS_ENDPOINT` is set.
///
/// Returns whether a listener was started.
pub fn fire_up_diagnostics(diagnostics: Diagnostics) -> bool {
    let endpoint = std::env::var(env::DIAGNOSTICS_ENDPOINT).ok();
    fire_up_diagnostics_at(endpoint.as_deref(), diagnostics)
}

/// Start the diagnostics listener on `endpoint` unless it is absent or empty.
pub fn fire_up_diagnostics_at(endpoint: Option<&str>, diagnostics: Diagnostics) -> bool {
    let Some(endpoint) = endpoint.map(str::trim).filter(|e| !e.is_empty()) else {
        return false;
    };
    let endpoint = endpoint.to_string();

    tokio::spawn(async move {
        let listener = match TcpListener::bind(&endpoint).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!(endpoint = %endpoint, error = %e, "Diagnostics listener failed to bind");
                return;
            }
        };
        tracing::info!(endpoint = %endpoint, "Diagnostics listener started");
        if let Err(e) = axum::serve(listener, router(diagnostics)).await {
            tracing::error!(error = %e, "Diagnostics listener stopped");
        }
    });
    true
}
