//! Bounded reads of inbound request bodies.
//!
//! A declared `Content-Length` over the limit is rejected before any byte is
//! read; otherwise the body is read chunk by chunk and rejected as soon as the
//! running total passes the limit, so chunked uploads are bounded the same way.

use std::pin::pin;

use axum::body::{Body, Bytes};
use axum::http::header::{self, HeaderMap};
use futures_util::TryStreamExt;

use crate::http::response::GatewayFailure;

#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    #[error("request body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("failed to read request body: {0}")]
    Read(#[source] axum::Error),
}

impl BodyError {
    pub fn failure(&self) -> GatewayFailure {
        match self {
            BodyError::TooLarge { .. } => GatewayFailure::PayloadTooLarge,
            BodyError::Read(_) => GatewayFailure::BadRequest,
        }
    }
}

/// Read `body` into memory, failing with [`BodyError::TooLarge`] past `limit` bytes.
pub async fn read_limited(headers: &HeaderMap, body: Body, limit: usize) -> Result<Bytes, BodyError> {
    if let Some(length) = content_length(headers) {
        if length > limit as u64 {
            return Err(BodyError::TooLarge { limit });
        }
    }

    let mut stream = pin!(body.into_data_stream());
    let mut buf = Vec::new();
    while let Some(chunk) = stream.try_next().await.map_err(BodyError::Read)? {
        if buf.len() + chunk.len() > limit {
            return Err(BodyError::TooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buf))
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn chunked(parts: &'static [&'static str]) -> Body {
        Body::from_stream(futures_util::stream::iter(
            parts.iter().map(|p| Ok::<_, std::io::Error>(Bytes::from_static(p.as_bytes()))),
        ))
    }

    #[tokio::test]
    async fn test_within_limit() {
        let body = read_limited(&HeaderMap::new(), chunked(&["ab", "cd"]), 4).await.unwrap();
        assert_eq!(&body[..], b"abcd");
    }

    #[tokio::test]
    async fn test_streamed_body_over_limit() {
        let err = read_limited(&HeaderMap::new(), chunked(&["abc", "def"]), 4)
            .await
            .unwrap_err();
        assert!(matches!(err, BodyError::TooLarge { limit: 4 }));
        assert_eq!(err.failure(), GatewayFailure::PayloadTooLarge);
    }

    #[tokio::test]
    async fn test_declared_length_over_limit() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("100"));

        let err = read_limited(&headers, Body::empty(), 4).await.unwrap_err();
        assert!(matches!(err, BodyError::TooLarge { limit: 4 }));
    }

    #[tokio::test]
    async fn test_broken_stream_is_bad_request() {
        let body = Body::from_stream(futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"ab")),
            Err(std::io::Error::other("reset")),
        ]));
        let err = read_limited(&HeaderMap::new(), body, 1024).await.unwrap_err();
        assert!(matches!(err, BodyError::Read(_)));
        assert_eq!(err.failure(), GatewayFailure::BadRequest);
    }
}
