//! Multi-backend composition.
//!
//! A route with several backends hands every request to a composition
//! function together with one forwarding handler per backend. The function
//! decides which backends to call, in what order, and how to merge.

use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Method, Request, Response, Uri, Version};
use futures_util::future::BoxFuture;

use crate::http::body::{read_limited, BodyError};
use crate::plugin::handler::SharedHandler;

/// An inbound request with its body read into memory, so it can be replayed
/// to any number of backends.
#[derive(Debug, Clone)]
pub struct BufferedRequest {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    client_addr: Option<SocketAddr>,
    body: Bytes,
}

impl BufferedRequest {
    /// Read `request`'s body, up to `limit` bytes.
    pub async fn from_request(request: Request<Body>, limit: usize) -> Result<Self, BodyError> {
        let (parts, body) = request.into_parts();
        let body = read_limited(&parts.headers, body, limit).await?;
        let client_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            client_addr,
            body,
        })
    }

    /// A fresh request carrying the same method, URI, headers and body.
    pub fn to_request(&self) -> Request<Body> {
        let mut request = Request::new(Body::from(self.body.clone()));
        *request.method_mut() = self.method.clone();
        *request.uri_mut() = self.uri.clone();
        *request.version_mut() = self.version;
        *request.headers_mut() = self.headers.clone();
        if let Some(addr) = self.client_addr {
            request.extensions_mut().insert(ConnectInfo(addr));
        }
        request
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// Backend name → that backend's forwarding handler.
#[derive(Clone, Default)]
pub struct BackendHandlerMap {
    handlers: Arc<BTreeMap<String, SharedHandler>>,
}

impl std::fmt::Debug for BackendHandlerMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

impl BackendHandlerMap {
    pub fn new(handlers: BTreeMap<String, SharedHandler>) -> Self {
        Self {
            handlers: Arc::new(handlers),
        }
    }

    pub fn get(&self, backend: &str) -> Option<&SharedHandler> {
        self.handlers.get(backend)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Backend names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SharedHandler)> {
        self.handlers.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Replay `request` to one backend. `None` if the backend is unknown.
    pub async fn call(&self, backend: &str, request: &BufferedRequest) -> Option<Response<Body>> {
        let handler = self.handlers.get(backend)?.clone();
        Some(handler.call(request.to_request()).await)
    }
}

/// The composition function of a multi-backend route.
pub trait Compose: Send + Sync {
    fn compose(
        &self,
        backends: BackendHandlerMap,
        request: BufferedRequest,
    ) -> BoxFuture<'static, Response<Body>>;
}

impl<F, Fut> Compose for F
where
    F: Fn(BackendHandlerMap, BufferedRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Response<Body>> + Send + 'static,
{
    fn compose(
        &self,
        backends: BackendHandlerMap,
        request: BufferedRequest,
    ) -> BoxFuture<'static, Response<Body>> {
        Box::pin(self(backends, request))
    }
}

pub type MultiBackendHandler = Arc<dyn Compose>;

/// What an adapter factory returns: the backend handlers it was given and
/// the composition function to run for each request.
#[derive(Clone)]
pub struct MultiBackendAdapter {
    pub backend_handlers: BackendHandlerMap,
    pub handler: MultiBackendHandler,
}

impl MultiBackendAdapter {
    pub fn new<C>(backend_handlers: BackendHandlerMap, handler: C) -> Self
    where
        C: Compose + 'static,
    {
        Self {
            backend_handlers,
            handler: Arc::new(handler),
        }
    }

    /// Run the composition function for one request.
    pub fn serve(&self, request: BufferedRequest) -> BoxFuture<'static, Response<Body>> {
        self.handler.compose(self.backend_handlers.clone(), request)
    }
}

/// Builds an adapter from the backend handlers of a route; registered by name.
pub type MultiBackendAdapterFactory =
    Arc<dyn Fn(BackendHandlerMap) -> MultiBackendAdapter + Send + Sync>;
