//! Listener serving.
//!
//! # Responsibilities
//! - Assemble one dispatch table per listener
//! - Create the Axum router that hands every request to the current table
//! - Wire up middleware (request ID, tracing)
//! - Bind listeners and serve until shutdown
//! - Run the health monitor and apply configuration reloads
//!
//! # Design Decisions
//! - Tables sit behind `ArcSwap`; a reload swaps every listener's table or none
//! - Listener addresses and outbound settings are fixed at startup

use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{body::Body, extract::State, http::Request, response::Response, Router};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::{GatewayConfig, GatewaySettings};
use crate::health::HealthMonitor;
use crate::http::forward::Forwarder;
use crate::lifecycle::Shutdown;
use crate::plugin::PluginRegistry;
use crate::routing::{Assembler, AssemblyError, DispatchTable, ManagedService, ServerPool};

type SharedTable = Arc<ArcSwap<DispatchTable>>;

#[derive(Debug, Clone)]
struct ListenerSlot {
    name: String,
    address: String,
    table: SharedTable,
}

/// Every listener of the gateway with its live dispatch table.
#[derive(Clone)]
pub struct Gateway {
    settings: GatewaySettings,
    assembler: Assembler,
    listeners: Vec<ListenerSlot>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    /// Assemble every listener. Any assembly error aborts the build.
    pub fn build(config: &GatewayConfig, registry: Arc<PluginRegistry>) -> Result<Self, AssemblyError> {
        let forwarder = Arc::new(Forwarder::new(
            &config.settings.timeouts,
            config.settings.max_body_bytes,
        ));
        let assembler = Assembler::new(registry, forwarder);

        let listeners = assemble_tables(&assembler, config)?
            .into_iter()
            .map(|table| {
                let service = table.service().clone();
                tracing::info!(
                    listener = %service.listener_name,
                    address = %service.address,
                    uris = ?table.uris(),
                    "Listener assembled"
                );
                ListenerSlot {
                    name: service.listener_name.clone(),
                    address: service.address.clone(),
                    table: Arc::new(ArcSwap::from_pointee(table)),
                }
            })
            .collect();

        Ok(Self {
            settings: config.settings.clone(),
            assembler,
            listeners,
        })
    }

    /// Re-assemble from `config` and swap every listener's table.
    ///
    /// Nothing is swapped if any listener fails to assemble. Listeners absent
    /// from `config` are left with an empty table; new listeners need a restart.
    pub fn reload(&self, config: &GatewayConfig) -> Result<(), AssemblyError> {
        let mut tables = assemble_tables(&self.assembler, config)?;

        for table in &tables {
            if !self.listeners.iter().any(|slot| slot.name == table.listener()) {
                tracing::warn!(
                    listener = %table.listener(),
                    "New listener ignored until restart"
                );
            }
        }

        for slot in &self.listeners {
            let table = match tables.iter().position(|t| t.listener() == slot.name) {
                Some(index) => tables.swap_remove(index),
                None => {
                    tracing::warn!(listener = %slot.name, "Listener removed from configuration; serving no routes");
                    empty_table(&slot.name, &slot.address)
                }
            };
            slot.table.store(Arc::new(table));
        }

        tracing::info!(listeners = self.listeners.len(), "Configuration reloaded");
        Ok(())
    }

    /// Live tables, in listener declaration order.
    pub fn tables(&self) -> Vec<Arc<ArcSwap<DispatchTable>>> {
        self.listeners.iter().map(|slot| slot.table.clone()).collect()
    }

    /// Current table of one listener.
    pub fn table(&self, listener: &str) -> Option<Arc<DispatchTable>> {
        self.listeners
            .iter()
            .find(|slot| slot.name == listener)
            .map(|slot| slot.table.load_full())
    }

    /// Bind every listener address.
    pub async fn bind(self) -> Result<BoundGateway, std::io::Error> {
        let mut sockets = Vec::with_capacity(self.listeners.len());
        for slot in &self.listeners {
            let socket = TcpListener::bind(&slot.address).await?;
            tracing::info!(
                listener = %slot.name,
                address = %socket.local_addr()?,
                "Listener bound"
            );
            sockets.push(socket);
        }
        Ok(BoundGateway {
            gateway: self,
            sockets,
        })
    }

    /// Bind and serve until shutdown.
    pub async fn run(
        self,
        shutdown: &Shutdown,
        updates: Option<mpsc::UnboundedReceiver<GatewayConfig>>,
    ) -> Result<(), std::io::Error> {
        self.bind().await?.serve(shutdown, updates).await
    }
}

/// A gateway whose listeners are bound but not yet serving.
pub struct BoundGateway {
    gateway: Gateway,
    sockets: Vec<TcpListener>,
}

impl BoundGateway {
    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// The bound address of a listener.
    pub fn local_addr(&self, listener: &str) -> Option<SocketAddr> {
        self.gateway
            .listeners
            .iter()
            .zip(&self.sockets)
            .find(|(slot, _)| slot.name == listener)
            .and_then(|(_, socket)| socket.local_addr().ok())
    }

    /// Serve every listener; start health checks and reloads.
    pub async fn serve(
        self,
        shutdown: &Shutdown,
        updates: Option<mpsc::UnboundedReceiver<GatewayConfig>>,
    ) -> Result<(), std::io::Error> {
        let BoundGateway { gateway, sockets } = self;

        let monitor = HealthMonitor::new(gateway.tables(), gateway.settings.health_check.clone());
        tokio::spawn(monitor.run(shutdown.subscribe()));

        if let Some(updates) = updates {
            tokio::spawn(reload_loop(gateway.clone(), updates, shutdown.subscribe()));
        }

        let mut servers = JoinSet::new();
        for (slot, socket) in gateway.listeners.iter().zip(sockets) {
            let app = router(slot.table.clone()).into_make_service_with_connect_info::<SocketAddr>();
            let mut stop = shutdown.subscribe();
            let name = slot.name.clone();
            servers.spawn(async move {
                axum::serve(socket, app)
                    .with_graceful_shutdown(async move {
                        let _ = stop.recv().await;
                    })
                    .await?;
                tracing::info!(listener = %name, "Listener stopped");
                Ok::<(), std::io::Error>(())
            });
        }

        while let Some(result) = servers.join_next().await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(e) => return Err(std::io::Error::other(e)),
            }
        }
        Ok(())
    }
}

/// Axum router handing every request to the listener's current table.
pub fn router(table: Arc<ArcSwap<DispatchTable>>) -> Router {
    Router::new()
        .fallback(dispatch)
        .with_state(table)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

async fn dispatch(State(table): State<SharedTable>, request: Request<Body>) -> Response<Body> {
    let table = table.load_full();
    table.dispatch(request).await
}

async fn reload_loop(
    gateway: Gateway,
    mut updates: mpsc::UnboundedReceiver<GatewayConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(config) => {
                    if let Err(e) = gateway.reload(&config) {
                        tracing::error!(error = %e, "Reload rejected; keeping current routes");
                    }
                }
                None => break,
            },
            _ = shutdown.recv() => break,
        }
    }
    tracing::debug!("Reload loop stopped");
}

fn assemble_tables(
    assembler: &Assembler,
    config: &GatewayConfig,
) -> Result<Vec<DispatchTable>, AssemblyError> {
    let mut pool = ServerPool::new();
    config
        .listeners
        .iter()
        .map(|listener| {
            let service = ManagedService::from_config(
                config,
                listener,
                assembler.registry().algorithms(),
                &mut pool,
            )?;
            assembler.assemble(Arc::new(service))
        })
        .collect()
}

fn empty_table(listener: &str, address: &str) -> DispatchTable {
    let service = ManagedService {
        listener_name: listener.to_string(),
        address: address.to_string(),
        routes: Vec::new(),
        plugins: Vec::new(),
    };
    DispatchTable::new(Arc::new(service), Vec::new())
}
