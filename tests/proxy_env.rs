//! Outbound proxy selection from the process environment.
//!
//! These tests mutate process-wide environment variables, so each one holds
//! `ENV_LOCK` for its whole duration.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use api_gateway::plugin::{BackendHandlerMap, BufferedRequest, MultiBackendAdapter};
use api_gateway::{GatewayConfig, PluginRegistry};
use axum::body::Body;
use axum::http::{Response, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

mod common;

static ENV_LOCK: Mutex<()> = Mutex::new(());

const PROXY_VARS: [&str; 6] = [
    "HTTP_PROXY",
    "http_proxy",
    "HTTPS_PROXY",
    "https_proxy",
    "NO_PROXY",
    "no_proxy",
];

/// Take the environment lock and start from a clean proxy environment.
fn clean_env() -> MutexGuard<'static, ()> {
    let guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    for var in PROXY_VARS {
        std::env::remove_var(var);
    }
    guard
}

/// A forward proxy that answers every request itself with 418, echoing its
/// tag and the request target it was asked for.
async fn start_mock_proxy(tag: &'static str) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let counter = counter.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let mut seen = Vec::new();
                while !seen.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => seen.extend_from_slice(&buf[..n]),
                    }
                }
                counter.fetch_add(1, Ordering::SeqCst);

                let head = String::from_utf8_lossy(&seen);
                let target = head.split_whitespace().nth(1).unwrap_or("").to_string();
                let body = format!("{} {}", tag, target);
                let response = format!(
                    "HTTP/1.1 418 I'm a teapot\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    (addr, hits)
}

fn remote_config(host: &str) -> GatewayConfig {
    common::single_backend_config(
        "/foo",
        api_gateway::config::ServerConfig::new("remote", host, 8080),
    )
}

#[tokio::test]
async fn test_forward_goes_through_http_proxy() {
    let _env = clean_env();
    let (proxy, hits) = start_mock_proxy("PROXY REACHED").await;
    std::env::set_var("HTTP_PROXY", format!("http://{}", proxy));

    let gw = common::start_gateway(&remote_config("backend.invalid"), PluginRegistry::new()).await;
    let res = common::client().get(gw.url("/foo?x=1")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::IM_A_TEAPOT);
    let body = res.text().await.unwrap();
    assert!(body.starts_with("PROXY REACHED "), "{}", body);
    assert!(body.contains("backend.invalid:8080/foo?x=1"), "{}", body);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_proxy_change_applies_to_next_request() {
    let _env = clean_env();
    let (proxy_a, hits_a) = start_mock_proxy("PROXY A").await;
    let (proxy_b, hits_b) = start_mock_proxy("PROXY B").await;

    let gw = common::start_gateway(&remote_config("backend.invalid"), PluginRegistry::new()).await;
    let client = common::client();

    std::env::set_var("HTTP_PROXY", format!("http://{}", proxy_a));
    let res = client.get(gw.url("/foo")).send().await.unwrap();
    assert!(res.text().await.unwrap().starts_with("PROXY A "));

    std::env::set_var("HTTP_PROXY", format!("http://{}", proxy_b));
    let res = client.get(gw.url("/foo")).send().await.unwrap();
    assert!(res.text().await.unwrap().starts_with("PROXY B "));

    assert_eq!(hits_a.load(Ordering::SeqCst), 1);
    assert_eq!(hits_b.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unresolvable_backend_without_proxy_fails() {
    let _env = clean_env();

    let gw = common::start_gateway(&remote_config("backend.invalid"), PluginRegistry::new()).await;
    let res = common::client().get(gw.url("/foo")).send().await.unwrap();
    assert!(res.status().is_server_error(), "{}", res.status());
}

#[tokio::test]
async fn test_no_proxy_bypasses_proxy() {
    let _env = clean_env();
    let (proxy, hits) = start_mock_proxy("PROXY REACHED").await;
    std::env::set_var("HTTP_PROXY", format!("http://{}", proxy));
    std::env::set_var("NO_PROXY", ".invalid");

    let gw = common::start_gateway(&remote_config("backend.invalid"), PluginRegistry::new()).await;
    let res = common::client().get(gw.url("/foo")).send().await.unwrap();

    assert!(res.status().is_server_error(), "{}", res.status());
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_loopback_backend_never_proxied() {
    let _env = clean_env();
    let (proxy, hits) = start_mock_proxy("PROXY REACHED").await;
    std::env::set_var("HTTP_PROXY", format!("http://{}", proxy));

    let backend = common::start_mock_backend("direct").await;
    let gw = common::start_gateway(
        &common::single_backend_config("/foo", common::server("local", backend)),
        PluginRegistry::new(),
    )
    .await;
    let res = common::client().get(gw.url("/foo")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "direct");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_multi_backend_handlers_use_proxy() {
    let _env = clean_env();
    let (proxy, hits) = start_mock_proxy("PROXY REACHED").await;
    std::env::set_var("HTTP_PROXY", format!("http://{}", proxy));

    let registry = PluginRegistry::new();
    registry
        .register_multi_backend_adapter_factory(
            "fan-out",
            Arc::new(|handlers: BackendHandlerMap| {
                MultiBackendAdapter::new(
                    handlers,
                    |backends: BackendHandlerMap, request: BufferedRequest| async move {
                        let mut statuses = Vec::new();
                        for name in backends.names() {
                            let response = backends.call(name, &request).await.unwrap();
                            statuses.push(response.status().as_u16().to_string());
                        }
                        Response::new(Body::from(statuses.join(",")))
                    },
                )
            }),
        )
        .unwrap();

    let mut config = remote_config("backend-a.invalid");
    config
        .servers
        .push(api_gateway::config::ServerConfig::new("remote-b", "backend-b.invalid", 8080));
    config.backends = vec![
        common::backend("a", &["remote"]),
        common::backend("b", &["remote-b"]),
    ];
    config.routes[0].backends = vec!["a".into(), "b".into()];
    config.routes[0].multi_backend_adapter = Some("fan-out".into());

    let gw = common::start_gateway(&config, registry).await;
    let res = common::client().get(gw.url("/foo")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "418,418");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_no_proxy_only_exempts_listed_hosts() {
    let _env = clean_env();
    let (proxy, hits) = start_mock_proxy("PROXY REACHED").await;
    std::env::set_var("HTTP_PROXY", format!("http://{}", proxy));
    std::env::set_var("no_proxy", "other.invalid,10.0.0.0/8");

    let gw = common::start_gateway(&remote_config("backend.invalid"), PluginRegistry::new()).await;
    let client = common::client();
    let res = client.get(gw.url("/foo")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::IM_A_TEAPOT);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    std::env::set_var("no_proxy", "backend.invalid");
    let res = client.get(gw.url("/foo")).send().await.unwrap();
    assert!(res.status().is_server_error(), "{}", res.status());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
