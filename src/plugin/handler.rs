//! The request handler contract shared by routes, wrappers and adapters.

use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use futures_util::future::BoxFuture;

/// Serves one request and produces its response.
///
/// Failures are expressed as responses; a handler never errors out of band.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, request: Request<Body>) -> BoxFuture<'static, Response<Body>>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response<Body>> + Send + 'static,
{
    fn call(&self, request: Request<Body>) -> BoxFuture<'static, Response<Body>> {
        Box::pin(self(request))
    }
}

/// A handler shared between the dispatch table, wrappers and adapters.
pub type SharedHandler = Arc<dyn Handler>;

/// Turn an async closure into a [`SharedHandler`].
pub fn handler_fn<F, Fut>(f: F) -> SharedHandler
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response<Body>> + Send + 'static,
{
    Arc::new(f)
}
