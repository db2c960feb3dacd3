//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use api_gateway::config::{
    BackendConfig, GatewayConfig, ListenerConfig, RouteConfig, ServerConfig,
};
use api_gateway::http::{BoundGateway, Gateway};
use api_gateway::{PluginRegistry, Shutdown};
use axum::http::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Start a simple mock backend that returns a fixed response.
pub async fn start_mock_backend(response: &'static str) -> SocketAddr {
    start_programmable_backend(move || async move { (200, response.to_string()) }).await
}

/// Start a programmable mock backend with async support.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        read_request_head(&mut socket).await;
                        let (status, body) = f().await;
                        let reason = StatusCode::from_u16(status)
                            .ok()
                            .and_then(|s| s.canonical_reason())
                            .unwrap_or("Unknown");

                        let response_str = format!(
                            "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status,
                            reason,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    addr
}

/// A backend that counts the requests it receives.
pub async fn start_counting_backend(response: &'static str) -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let addr = start_programmable_backend(move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            (200, response.to_string())
        }
    })
    .await;
    (addr, hits)
}

/// Serve an axum router on an ephemeral port.
pub async fn start_axum_backend(router: axum::Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// A backend that reads one request and never answers. The receiver fires
/// once the caller hangs up on it.
pub async fn start_stalled_backend() -> (SocketAddr, tokio::sync::oneshot::Receiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (closed_tx, closed_rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        read_request_head(&mut socket).await;
        let mut buf = [0u8; 1024];
        loop {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
        let _ = closed_tx.send(());
    });
    (addr, closed_rx)
}

/// Drain the request head so the client never sees a reset.
async fn read_request_head(socket: &mut tokio::net::TcpStream) {
    let mut buf = vec![0u8; 8192];
    let mut seen = Vec::new();
    while !seen.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => seen.extend_from_slice(&buf[..n]),
        }
    }
}

pub fn server(name: &str, addr: SocketAddr) -> ServerConfig {
    ServerConfig::new(name, addr.ip().to_string(), addr.port())
}

pub fn backend(name: &str, servers: &[&str]) -> BackendConfig {
    BackendConfig {
        name: name.into(),
        servers: servers.iter().map(|s| s.to_string()).collect(),
        load_balancer_policy: "round-robin".into(),
    }
}

pub fn route(name: &str, uri_root: &str, backends: &[&str]) -> RouteConfig {
    RouteConfig {
        name: name.into(),
        uri_root: uri_root.into(),
        backends: backends.iter().map(|b| b.to_string()).collect(),
        plugins: vec![],
        multi_backend_adapter: None,
        guard: None,
    }
}

pub fn listener(routes: &[&str]) -> ListenerConfig {
    ListenerConfig {
        name: "main".into(),
        address: "127.0.0.1:0".into(),
        routes: routes.iter().map(|r| r.to_string()).collect(),
        plugins: vec![],
    }
}

/// One listener, one route, one backend, one server.
pub fn single_backend_config(uri_root: &str, server_config: ServerConfig) -> GatewayConfig {
    let server_name = server_config.name.clone();
    GatewayConfig {
        servers: vec![server_config],
        backends: vec![backend("backend1", &[&server_name])],
        routes: vec![route("route1", uri_root, &["backend1"])],
        listeners: vec![listener(&["route1"])],
        ..Default::default()
    }
}

/// A running gateway on an ephemeral port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub gateway: Gateway,
    pub shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_gateway(config: &GatewayConfig, registry: PluginRegistry) -> TestGateway {
    let gateway = Gateway::build(config, Arc::new(registry)).unwrap();
    serve(gateway.bind().await.unwrap()).await
}

pub async fn serve(bound: BoundGateway) -> TestGateway {
    let addr = bound.local_addr("main").unwrap();
    let gateway = bound.gateway().clone();
    let shutdown = Shutdown::new();
    let serving = shutdown.clone();
    tokio::spawn(async move {
        let _ = bound.serve(&serving, None).await;
    });
    TestGateway {
        addr,
        gateway,
        shutdown,
    }
}

/// A client that never goes through an outbound proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
