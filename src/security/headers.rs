//! Security response headers.
//!
//! Every response carries HSTS, a same-origin frame policy, MIME sniffing
//! disabled and no referrer. Handlers may set their own values; these only
//! fill in what is missing.

use axum::http::{header, HeaderName, HeaderValue};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;

pub const STRICT_TRANSPORT_SECURITY: &str = "max-age=15552000; includeSubDomains";

fn defaults() -> [(HeaderName, HeaderValue); 4] {
    [
        (
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static(STRICT_TRANSPORT_SECURITY),
        ),
        (header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN")),
        (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
        (header::REFERRER_POLICY, HeaderValue::from_static("no-referrer")),
    ]
}

/// Wrap `router` so every response gets the security headers.
pub fn with_security_headers<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    defaults().into_iter().fold(router, |router, (name, value)| {
        router.layer(SetResponseHeaderLayer::if_not_present(name, value))
    })
}
