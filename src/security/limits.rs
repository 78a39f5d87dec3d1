//! Request body size limits.
//!
//! A declared `Content-Length` over the cap is rejected before any of the
//! body is read. Bodies without one (chunked) are read up to the cap and
//! rejected as soon as they cross it.

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap};

#[derive(Debug, thiserror::Error)]
pub enum BodyLimitError {
    #[error("request body exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("failed to read request body: {0}")]
    Read(String),
}

/// Declared body length, if the client sent a parseable one.
pub fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Reject early on a declared length over `limit`.
pub fn check_declared(headers: &HeaderMap, limit: usize) -> Result<(), BodyLimitError> {
    match declared_length(headers) {
        Some(length) if length > limit as u64 => Err(BodyLimitError::TooLarge { limit }),
        _ => Ok(()),
    }
}

/// Buffer `body`, failing once it grows past `limit` bytes.
pub async fn read_capped(body: Body, limit: usize) -> Result<Bytes, BodyLimitError> {
    axum::body::to_bytes(body, limit).await.map_err(|e| {
        if is_length_limit(&e) {
            BodyLimitError::TooLarge { limit }
        } else {
            BodyLimitError::Read(e.to_string())
        }
    })
}

fn is_length_limit(error: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(err) = source {
        if err.is::<http_body_util::LengthLimitError>() {
            return true;
        }
        source = err.source();
    }
    false
}
