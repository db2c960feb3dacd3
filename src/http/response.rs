//! Gateway-generated responses and header hygiene.
//!
//! # Responsibilities
//! - Build the gateway's own failure responses
//! - Strip hop-by-hop headers in both directions
//!
//! # Design Decisions
//! - No healthy backend → 503; forwarding failure → 502; outbound timeout → 504
//! - Gateway failures carry `x-gateway-error` so they are never mistaken for
//!   a backend's own status

use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Response, StatusCode};
use axum::response::IntoResponse;

pub const X_GATEWAY_ERROR: &str = "x-gateway-error";

/// Why the gateway answered on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayFailure {
    NoBackendAvailable,
    NoRouteApplies,
    NotFound,
    BadGateway,
    GatewayTimeout,
    BadRequest,
    PayloadTooLarge,
}

impl GatewayFailure {
    pub fn status(self) -> StatusCode {
        match self {
            GatewayFailure::NoBackendAvailable | GatewayFailure::NoRouteApplies => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayFailure::NotFound => StatusCode::NOT_FOUND,
            GatewayFailure::BadGateway => StatusCode::BAD_GATEWAY,
            GatewayFailure::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
            GatewayFailure::BadRequest => StatusCode::BAD_REQUEST,
            GatewayFailure::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    fn code(self) -> &'static str {
        match self {
            GatewayFailure::NoBackendAvailable => "no-backend-available",
            GatewayFailure::NoRouteApplies => "no-route-applies",
            GatewayFailure::NotFound => "not-found",
            GatewayFailure::BadGateway => "bad-gateway",
            GatewayFailure::GatewayTimeout => "gateway-timeout",
            GatewayFailure::BadRequest => "bad-request",
            GatewayFailure::PayloadTooLarge => "payload-too-large",
        }
    }

    fn message(self) -> &'static str {
        match self {
            GatewayFailure::NoBackendAvailable => "No healthy backends",
            GatewayFailure::NoRouteApplies => "No route applies to this request",
            GatewayFailure::NotFound => "No matching route found",
            GatewayFailure::BadGateway => "Upstream request failed",
            GatewayFailure::GatewayTimeout => "Upstream request timed out",
            GatewayFailure::BadRequest => "Unable to read request body",
            GatewayFailure::PayloadTooLarge => "Request body too large",
        }
    }
}

impl IntoResponse for GatewayFailure {
    fn into_response(self) -> Response<Body> {
        (
            self.status(),
            [(HeaderName::from_static(X_GATEWAY_ERROR), HeaderValue::from_static(self.code()))],
            self.message(),
        )
            .into_response()
    }
}

const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
}
