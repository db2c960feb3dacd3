//! Cross-cutting handler decorators.

use std::sync::Arc;

use crate::plugin::handler::SharedHandler;

/// Decorates a handler without changing its request/response contract.
pub trait Wrapper: Send + Sync {
    fn wrap(&self, inner: SharedHandler) -> SharedHandler;
}

/// Produces a wrapper instance; registered by name.
pub type WrapperFactory = Arc<dyn Fn() -> Arc<dyn Wrapper> + Send + Sync>;

/// Apply `wrappers` around `handler`.
///
/// The first wrapper is the outermost: it sees the request first and the
/// response last.
pub fn apply_wrappers(handler: SharedHandler, wrappers: &[Arc<dyn Wrapper>]) -> SharedHandler {
    wrappers
        .iter()
        .rev()
        .fold(handler, |inner, wrapper| wrapper.wrap(inner))
}
