//! Request identifiers.
//!
//! Every request gets an `x-request-id` (UUID v4) as early as possible so
//! the trace span and every log line for it can be correlated. A client
//! supplied id is kept. The id is copied onto the response.

use axum::http::{HeaderMap, HeaderName};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Assigns an id to requests that arrive without one.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid)
}

/// Copies the request id onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(X_REQUEST_ID)
}

/// Read access to the request id.
pub trait RequestIdExt {
    fn request_id(&self) -> &str;
}

impl RequestIdExt for HeaderMap {
    fn request_id(&self) -> &str {
        self.get(&X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
    }
}
