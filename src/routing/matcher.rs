//! Route guards.
//!
//! # Responsibilities
//! - Decide whether a route applies to a request sharing its URI root
//! - Match host header (exact match, case-insensitive)
//! - Match method and header values
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Host matching is case-insensitive
//! - Empty condition = always matches (wildcard)
//! - No regex to guarantee O(n) matching

use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::{Method, Request};

use crate::config::GuardConfig;

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, req: &Request<Body>) -> bool;

    /// Whether this matcher accepts every request.
    fn always(&self) -> bool {
        false
    }
}

/// Accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysMatch;

impl Matcher for AlwaysMatch {
    fn matches(&self, _req: &Request<Body>) -> bool {
        true
    }

    fn always(&self) -> bool {
        true
    }
}

/// Matches the Host header.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    expected_host: String,
}

impl HostMatcher {
    /// The host is normalized to lowercase for case-insensitive matching.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            expected_host: host.into().to_lowercase(),
        }
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        req.headers()
            .get("host")
            .and_then(|h| h.to_str().ok())
            .map(|h| h.to_lowercase() == self.expected_host)
            .unwrap_or(false)
    }
}

/// Matches one of a set of methods.
#[derive(Debug, Clone)]
pub struct MethodMatcher {
    methods: Vec<Method>,
}

impl MethodMatcher {
    pub fn new(methods: Vec<Method>) -> Self {
        Self { methods }
    }
}

impl Matcher for MethodMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        self.methods.iter().any(|m| m == req.method())
    }
}

/// Matches an exact header value.
#[derive(Debug, Clone)]
pub struct HeaderMatcher {
    name: HeaderName,
    value: HeaderValue,
}

impl HeaderMatcher {
    pub fn new(name: HeaderName, value: HeaderValue) -> Self {
        Self { name, value }
    }
}

impl Matcher for HeaderMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        req.headers()
            .get_all(&self.name)
            .iter()
            .any(|v| *v == self.value)
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        self.matchers.iter().all(|m| m.matches(req))
    }

    fn always(&self) -> bool {
        self.matchers.iter().all(|m| m.always())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardError {
    #[error("invalid method '{0}'")]
    InvalidMethod(String),

    #[error("invalid header '{name}: {value}'")]
    InvalidHeader { name: String, value: String },
}

/// Compile a route's guard definition. No guard, or an empty one, always matches.
pub fn from_guard_config(guard: Option<&GuardConfig>) -> Result<Arc<dyn Matcher>, GuardError> {
    let Some(guard) = guard else {
        return Ok(Arc::new(AlwaysMatch));
    };

    let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();

    if !guard.methods.is_empty() {
        let methods = guard
            .methods
            .iter()
            .map(|m| {
                Method::from_bytes(m.to_uppercase().as_bytes())
                    .map_err(|_| GuardError::InvalidMethod(m.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        matchers.push(Box::new(MethodMatcher::new(methods)));
    }

    if let Some(host) = &guard.host {
        matchers.push(Box::new(HostMatcher::new(host.as_str())));
    }

    for (name, value) in &guard.headers {
        let invalid = || GuardError::InvalidHeader {
            name: name.clone(),
            value: value.clone(),
        };
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        matchers.push(Box::new(HeaderMatcher::new(header_name, header_value)));
    }

    if matchers.is_empty() {
        Ok(Arc::new(AlwaysMatch))
    } else {
        Ok(Arc::new(AndMatcher::new(matchers)))
    }
}
