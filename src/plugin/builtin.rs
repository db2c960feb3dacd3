//! Built-in wrappers: request timing and request logging.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::Request;

use crate::plugin::handler::{handler_fn, SharedHandler};
use crate::plugin::registry::{PluginRegistry, RegistryError};
use crate::plugin::wrapper::{Wrapper, WrapperFactory};

pub const TIMING: &str = "timing";
pub const LOGGING: &str = "logging";

/// Logs how long the wrapped handler took.
#[derive(Debug, Default)]
pub struct TimingWrapper;

impl TimingWrapper {
    pub fn new() -> Self {
        Self
    }
}

impl Wrapper for TimingWrapper {
    fn wrap(&self, inner: SharedHandler) -> SharedHandler {
        handler_fn(move |request: Request<Body>| {
            let inner = inner.clone();
            async move {
                let start = Instant::now();
                let method = request.method().clone();
                let path = request.uri().path().to_string();

                let response = inner.call(request).await;

                tracing::info!(
                    method = %method,
                    path = %path,
                    status = response.status().as_u16(),
                    elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Request timed"
                );
                response
            }
        })
    }
}

/// Logs every request and the status it produced.
#[derive(Debug, Default)]
pub struct LoggingWrapper;

impl LoggingWrapper {
    pub fn new() -> Self {
        Self
    }
}

impl Wrapper for LoggingWrapper {
    fn wrap(&self, inner: SharedHandler) -> SharedHandler {
        handler_fn(move |request: Request<Body>| {
            let inner = inner.clone();
            async move {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown")
                    .to_string();
                tracing::info!(
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    "Inbound request"
                );

                let response = inner.call(request).await;

                tracing::debug!(
                    request_id = %request_id,
                    status = response.status().as_u16(),
                    "Request completed"
                );
                response
            }
        })
    }
}

pub fn timing_factory() -> WrapperFactory {
    Arc::new(|| Arc::new(TimingWrapper::new()) as Arc<dyn Wrapper>)
}

pub fn logging_factory() -> WrapperFactory {
    Arc::new(|| Arc::new(LoggingWrapper::new()) as Arc<dyn Wrapper>)
}

/// Register `timing` and `logging`.
pub fn register_builtin_plugins(registry: &PluginRegistry) -> Result<(), RegistryError> {
    registry.register_wrapper_factory(TIMING, timing_factory())?;
    registry.register_wrapper_factory(LOGGING, logging_factory())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Response, StatusCode};

    #[tokio::test]
    async fn test_wrappers_preserve_response() {
        let handler = handler_fn(|_req: Request<Body>| async {
            Response::builder()
                .status(StatusCode::IM_A_TEAPOT)
                .header("x-backend", "a")
                .body(Body::from("short and stout"))
                .unwrap()
        });
        let wrapped = TimingWrapper::new().wrap(LoggingWrapper::new().wrap(handler));

        let response = wrapped.call(Request::new(Body::empty())).await;
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(response.headers()["x-backend"], "a");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"short and stout");
    }

    #[test]
    fn test_register_builtins() {
        let registry = PluginRegistry::new();
        register_builtin_plugins(&registry).unwrap();
        assert!(registry.contains_wrapper(TIMING));
        assert!(registry.contains_wrapper(LOGGING));
    }
}
