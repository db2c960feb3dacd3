//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every server referenced by the live dispatch tables
//! - Update server health state based on results

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::http::Request;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::sync::broadcast;
use tokio::time;

use crate::config::HealthCheckConfig;
use crate::load_balancer::Server;
use crate::routing::DispatchTable;

pub struct HealthMonitor {
    tables: Vec<Arc<ArcSwap<DispatchTable>>>,
    config: HealthCheckConfig,
    client: Client<HttpConnector, Body>,
}

impl HealthMonitor {
    pub fn new(tables: Vec<Arc<ArcSwap<DispatchTable>>>, config: HealthCheckConfig) -> Self {
        // Probes connect directly; proxy variables are never consulted.
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Self {
            tables,
            config,
            client,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval = self.config.interval_secs,
            "Health monitor starting"
        );

        let interval = Duration::from_secs(self.config.interval_secs.max(1));
        let mut ticker = time::interval(interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Servers of the current tables, each once, in table order.
    pub fn servers(&self) -> Vec<Arc<Server>> {
        let mut seen = HashSet::new();
        let mut servers = Vec::new();
        for table in &self.tables {
            let table = table.load();
            for lb in table.service().load_balancers() {
                for server in lb.servers() {
                    if server.config.health_check && seen.insert(Arc::as_ptr(server)) {
                        servers.push(server.clone());
                    }
                }
            }
        }
        servers
    }

    /// Probe every server once.
    pub async fn check_all(&self) {
        let probes = self.servers().into_iter().map(|server| async move {
            let healthy = self.probe(&server).await;
            let changed = if healthy {
                server.mark_success(self.config.healthy_threshold as usize)
            } else {
                server.mark_failure(self.config.unhealthy_threshold as usize)
            };
            if changed {
                tracing::info!(
                    server = %server.name(),
                    addr = %server.authority(),
                    state = ?server.health(),
                    "Server health changed"
                );
            }
        });
        futures_util::future::join_all(probes).await;
    }

    async fn probe(&self, server: &Server) -> bool {
        let addr = server.authority();
        let uri_string = format!("http://{}{}", addr, server.config.ping_uri);

        let request = match Request::builder()
            .method("GET")
            .uri(uri_string)
            .header("user-agent", "api-gateway-health-check")
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => {
                tracing::error!(server = %server.name(), "Failed to build health check request: {}", e);
                return false;
            }
        };

        let timeout = Duration::from_secs(self.config.timeout_secs);
        match time::timeout(timeout, self.client.request(request)).await {
            Ok(Ok(response)) => {
                let success = response.status().is_success();
                if !success {
                    tracing::warn!(addr = %addr, status = %response.status(), "Health check failed: non-success status");
                }
                success
            }
            Ok(Err(e)) => {
                tracing::warn!(addr = %addr, error = %e, "Health check failed: connection error");
                false
            }
            Err(_) => {
                tracing::warn!(addr = %addr, "Health check failed: timeout");
                false
            }
        }
    }
}
