//! Stage outcomes and the rejection taxonomy.

use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::auth::AuthError;
use crate::store::StoreError;

/// Result of one admission stage.
#[derive(Debug)]
pub enum Verdict {
    Continue,
    Reject(Rejection),
}

impl From<Result<(), Rejection>> for Verdict {
    fn from(result: Result<(), Rejection>) -> Self {
        match result {
            Ok(()) => Verdict::Continue,
            Err(rejection) => Verdict::Reject(rejection),
        }
    }
}

/// Why a request was refused before reaching its handler.
#[derive(Debug, thiserror::Error)]
pub enum Rejection {
    #[error("Server too busy")]
    Overloaded,

    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("{0}")]
    MalformedBody(String),

    #[error("{message}")]
    RateLimited { message: String, retry_after: Duration },

    #[error("Too many failed attempts. Please try again later.")]
    Locked,

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Service temporarily unavailable")]
    StoreUnavailable(#[source] StoreError),
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::Overloaded | Rejection::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Rejection::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Rejection::MalformedBody(_) => StatusCode::BAD_REQUEST,
            Rejection::RateLimited { .. } | Rejection::Locked => StatusCode::TOO_MANY_REQUESTS,
            Rejection::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Rejection::Unauthorized(_) => StatusCode::FORBIDDEN,
        }
    }

    /// Metric label.
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::Overloaded => "overloaded",
            Rejection::PayloadTooLarge { .. } => "payload_too_large",
            Rejection::MalformedBody(_) => "malformed_body",
            Rejection::RateLimited { .. } => "rate_limited",
            Rejection::Locked => "locked",
            Rejection::Unauthenticated(_) => "unauthenticated",
            Rejection::Unauthorized(_) => "unauthorized",
            Rejection::StoreUnavailable(_) => "store_unavailable",
        }
    }
}

impl From<StoreError> for Rejection {
    fn from(err: StoreError) -> Self {
        Rejection::StoreUnavailable(err)
    }
}

impl From<AuthError> for Rejection {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthenticated(message) => Rejection::Unauthenticated(message),
            AuthError::Unauthorized(message) => Rejection::Unauthorized(message),
            AuthError::Store(err) => Rejection::StoreUnavailable(err),
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "success": false,
            "message": self.to_string(),
        }));
        let mut response = (status, body).into_response();
        if let Rejection::RateLimited { retry_after, .. } = &self {
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }
        response
    }
}
