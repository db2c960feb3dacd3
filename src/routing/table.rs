//! Per-listener dispatch table.
//!
//! # Design Decisions
//! - Immutable after construction; reload builds a new table and swaps it in
//! - Longest URI root wins
//! - A root ending in `/` matches any path below it; otherwise it matches
//!   the exact path or the path followed by `/...`
//! - Explicit 404 rather than a silent default route

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use futures_util::future::BoxFuture;

use crate::http::response::GatewayFailure;
use crate::plugin::SharedHandler;
use crate::routing::model::ManagedService;

pub struct DispatchTable {
    /// Sorted by URI root length, longest first.
    entries: Vec<(String, SharedHandler)>,
    service: Arc<ManagedService>,
}

impl std::fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchTable")
            .field("listener", &self.service.listener_name)
            .field("uris", &self.uris())
            .finish()
    }
}

impl DispatchTable {
    pub fn new(service: Arc<ManagedService>, mut entries: Vec<(String, SharedHandler)>) -> Self {
        // Stable: equal-length roots keep declaration order.
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { entries, service }
    }

    pub fn listener(&self) -> &str {
        &self.service.listener_name
    }

    pub fn service(&self) -> &Arc<ManagedService> {
        &self.service
    }

    /// URI roots in match order.
    pub fn uris(&self) -> Vec<&str> {
        self.entries.iter().map(|(uri, _)| uri.as_str()).collect()
    }

    /// The entry serving `path`, if any.
    pub fn lookup(&self, path: &str) -> Option<(&str, &SharedHandler)> {
        self.entries
            .iter()
            .find(|(root, _)| uri_matches(root, path))
            .map(|(root, handler)| (root.as_str(), handler))
    }

    /// Route `request` to its handler, or answer 404.
    pub fn dispatch(&self, request: Request<Body>) -> BoxFuture<'static, Response<Body>> {
        match self.lookup(request.uri().path()) {
            Some((_, handler)) => handler.call(request),
            None => {
                tracing::warn!(
                    listener = %self.listener(),
                    path = %request.uri().path(),
                    "No route matched"
                );
                Box::pin(async { GatewayFailure::NotFound.into_response() })
            }
        }
    }
}

fn uri_matches(root: &str, path: &str) -> bool {
    if root.ends_with('/') {
        return path.starts_with(root);
    }
    match path.strip_prefix(root) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
