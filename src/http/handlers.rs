//! Route dispatch handlers.
//!
//! A single-backend route selects a server and forwards to it. A
//! multi-backend route buffers the request and hands it to the route's
//! composition function together with one single-backend handler per backend.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use futures_util::future::BoxFuture;

use crate::http::forward::{ForwardError, Forwarder};
use crate::http::response::GatewayFailure;
use crate::load_balancer::LoadBalancer;
use crate::plugin::{BufferedRequest, Handler, MultiBackendAdapter};

/// Forwards every request to one server of one backend.
#[derive(Debug, Clone)]
pub struct BackendHandler {
    load_balancer: Arc<LoadBalancer>,
    forwarder: Arc<Forwarder>,
}

impl BackendHandler {
    pub fn new(load_balancer: Arc<LoadBalancer>, forwarder: Arc<Forwarder>) -> Self {
        Self {
            load_balancer,
            forwarder,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.load_balancer.backend_name()
    }

    async fn dispatch(self, request: Request<Body>) -> Response<Body> {
        let server = match self.load_balancer.select() {
            Ok(server) => server,
            Err(e) => {
                tracing::warn!(
                    backend = %e.backend,
                    path = %request.uri().path(),
                    "No healthy backends"
                );
                return GatewayFailure::NoBackendAvailable.into_response();
            }
        };

        match self.forwarder.forward(&server, request).await {
            Ok(response) => response,
            Err(e) => {
                log_forward_error(self.backend_name(), server.name(), &e);
                e.failure().into_response()
            }
        }
    }
}

fn log_forward_error(backend: &str, server: &str, error: &ForwardError) {
    match error {
        ForwardError::PayloadTooLarge { .. } | ForwardError::Body(_) => {
            tracing::debug!(backend, server, error = %error, "Rejected inbound body")
        }
        _ => tracing::error!(backend, server, error = %error, "Upstream error"),
    }
}

impl Handler for BackendHandler {
    fn call(&self, request: Request<Body>) -> BoxFuture<'static, Response<Body>> {
        Box::pin(self.clone().dispatch(request))
    }
}

/// Runs a multi-backend adapter's composition function for every request.
#[derive(Clone)]
pub struct MultiBackendRouteHandler {
    route: String,
    adapter: MultiBackendAdapter,
    max_body_bytes: usize,
}

impl MultiBackendRouteHandler {
    pub fn new(route: impl Into<String>, adapter: MultiBackendAdapter, max_body_bytes: usize) -> Self {
        Self {
            route: route.into(),
            adapter,
            max_body_bytes,
        }
    }

    pub fn adapter(&self) -> &MultiBackendAdapter {
        &self.adapter
    }
}

impl Handler for MultiBackendRouteHandler {
    fn call(&self, request: Request<Body>) -> BoxFuture<'static, Response<Body>> {
        let this = self.clone();
        Box::pin(async move {
            match BufferedRequest::from_request(request, this.max_body_bytes).await {
                Ok(buffered) => this.adapter.serve(buffered).await,
                Err(e) => {
                    tracing::warn!(route = %this.route, error = %e, "Unable to buffer request body");
                    e.failure().into_response()
                }
            }
        })
    }
}
