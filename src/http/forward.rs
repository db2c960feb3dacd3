//! Outbound forwarding to a selected server.
//!
//! # Responsibilities
//! - Rewrite the inbound request for the server's authority
//! - Resolve the outbound proxy from the environment on every call
//! - Stream the server's response back unmodified (minus hop-by-hop headers)
//!
//! # Design Decisions
//! - One `reqwest::Client` per resolved proxy and `NO_PROXY` list, so pooling
//!   survives while the environment is still re-read per call
//! - Redirects are passed through to the caller, never followed
//! - Dropping the returned future drops the outbound call

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Request, Response, StatusCode};
use dashmap::DashMap;
use url::Url;

use crate::config::TimeoutConfig;
use crate::http::body::{read_limited, BodyError};
use crate::http::proxy_env::{InvalidProxyUrl, OutboundProxy, ProxySettings};
use crate::http::response::{strip_hop_by_hop, GatewayFailure};
use crate::load_balancer::Server;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("invalid target url '{0}'")]
    InvalidTarget(String),

    #[error(transparent)]
    Proxy(#[from] InvalidProxyUrl),

    #[error("failed to build outbound client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("failed to read request body: {0}")]
    Body(#[source] axum::Error),

    #[error("connection to {target} failed: {source}")]
    Connect {
        target: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {target} timed out")]
    Timeout {
        target: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {target} failed: {source}")]
    Upstream {
        target: String,
        #[source]
        source: reqwest::Error,
    },
}

impl From<BodyError> for ForwardError {
    fn from(error: BodyError) -> Self {
        match error {
            BodyError::TooLarge { limit } => ForwardError::PayloadTooLarge { limit },
            BodyError::Read(source) => ForwardError::Body(source),
        }
    }
}

impl ForwardError {
    /// The gateway failure reported to the caller.
    pub fn failure(&self) -> GatewayFailure {
        match self {
            ForwardError::PayloadTooLarge { .. } => GatewayFailure::PayloadTooLarge,
            ForwardError::Body(_) => GatewayFailure::BadRequest,
            ForwardError::Timeout { .. } => GatewayFailure::GatewayTimeout,
            ForwardError::InvalidTarget(_)
            | ForwardError::Proxy(_)
            | ForwardError::Client(_)
            | ForwardError::Connect { .. }
            | ForwardError::Upstream { .. } => GatewayFailure::BadGateway,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.failure().status()
    }
}

/// Sends requests to servers over HTTP.
#[derive(Debug)]
pub struct Forwarder {
    /// Resolved proxy (None = direct) → client.
    clients: DashMap<Option<OutboundProxy>, reqwest::Client>,
    connect_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
    max_body_bytes: usize,
}

impl Forwarder {
    pub fn new(timeouts: &TimeoutConfig, max_body_bytes: usize) -> Self {
        Self {
            clients: DashMap::new(),
            connect_timeout: timeouts.connect_secs.map(Duration::from_secs),
            request_timeout: timeouts.request_secs.map(Duration::from_secs),
            max_body_bytes,
        }
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Forward `request` to `server` and return the server's response.
    pub async fn forward(
        &self,
        server: &Server,
        request: Request<Body>,
    ) -> Result<Response<Body>, ForwardError> {
        let (parts, body) = request.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let raw_target = format!("http://{}{}", server.authority(), path_and_query);
        let target =
            Url::parse(&raw_target).map_err(|_| ForwardError::InvalidTarget(raw_target.clone()))?;

        let proxy = ProxySettings::from_env().proxy_for(&target)?;
        let client = self.client_for(proxy.as_ref())?;

        let body = read_limited(&parts.headers, body, self.max_body_bytes).await?;

        let client_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let headers = outbound_headers(parts.headers, client_addr);

        tracing::debug!(
            server = %server.name(),
            target = %target,
            proxy = ?proxy.as_ref().map(|p| p.url.as_str()),
            method = %parts.method,
            "Forwarding request"
        );

        let mut outbound = client.request(parts.method, target).headers(headers).body(body);
        if let Some(timeout) = self.request_timeout {
            outbound = outbound.timeout(timeout);
        }

        let mut upstream = outbound
            .send()
            .await
            .map_err(|e| classify(raw_target, e))?;

        let status = upstream.status();
        let mut headers = std::mem::take(upstream.headers_mut());
        strip_hop_by_hop(&mut headers);

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }

    fn client_for(&self, proxy: Option<&OutboundProxy>) -> Result<reqwest::Client, ForwardError> {
        let key = proxy.cloned();
        if let Some(client) = self.clients.get(&key) {
            return Ok(client.value().clone());
        }

        let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());
        builder = match proxy {
            Some(proxy) => builder.proxy(proxy.to_reqwest().map_err(ForwardError::Client)?),
            None => builder.no_proxy(),
        };
        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder.build().map_err(ForwardError::Client)?;

        tracing::debug!(proxy = ?key, "Outbound client created");
        Ok(self.clients.entry(key).or_insert(client).value().clone())
    }
}

fn classify(target: String, source: reqwest::Error) -> ForwardError {
    if source.is_timeout() {
        ForwardError::Timeout { target, source }
    } else if source.is_connect() {
        ForwardError::Connect { target, source }
    } else {
        ForwardError::Upstream { target, source }
    }
}

/// Inbound headers minus hop-by-hop and `Host`, plus forwarding headers.
fn outbound_headers(mut headers: HeaderMap, client_addr: Option<SocketAddr>) -> HeaderMap {
    strip_hop_by_hop(&mut headers);

    if let Some(host) = headers.remove(header::HOST) {
        headers.insert(X_FORWARDED_HOST, host);
    }
    // reqwest recomputes the length from the buffered body.
    headers.remove(header::CONTENT_LENGTH);

    if let Some(addr) = client_addr {
        let ip = addr.ip().to_string();
        let forwarded_for = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(existing) => format!("{}, {}", existing, ip),
            None => ip,
        };
        if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }
    headers
}
