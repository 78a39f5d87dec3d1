//! Per-request state threaded through the admission stages.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::ConnectInfo;
use axum::http::request::Parts;
use axum::http::uri::PathAndQuery;
use axum::http::{header, HeaderValue, Request, Uri};

use crate::auth::Identity;
use crate::http::cookies::CookieJar;
use crate::routing::RoutePolicy;
use crate::security::sanitize::encode_pairs;
use crate::session::SessionHandle;

/// Key the per-client counters are stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKey(pub String);

impl ClientKey {
    pub const UNKNOWN: &'static str = "unknown";

    pub fn from_parts(parts: &Parts) -> Self {
        let key = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| Self::UNKNOWN.to_string());
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug)]
pub(crate) enum Payload {
    Pending(Body),
    Buffered(Bytes),
}

/// A request under admission.
#[derive(Debug)]
pub struct Admission {
    pub parts: Parts,
    pub(crate) payload: Payload,
    pub client: ClientKey,
    pub policy: Arc<RoutePolicy>,
    pub cookies: CookieJar,
    pub session: Option<SessionHandle>,
    pub identity: Option<Identity>,
    /// Set once the lockout stage has counted this credential submission.
    pub attempt_reserved: bool,
}

impl Admission {
    pub fn new(request: Request<Body>, policy: Arc<RoutePolicy>) -> Self {
        let (parts, body) = request.into_parts();
        let client = ClientKey::from_parts(&parts);
        let cookies = CookieJar::from_headers(&parts.headers);
        Self {
            parts,
            payload: Payload::Pending(body),
            client,
            policy,
            cookies,
            session: None,
            identity: None,
            attempt_reserved: false,
        }
    }

    /// Buffered body, once the size stage has read it.
    pub fn body(&self) -> Option<&Bytes> {
        match &self.payload {
            Payload::Buffered(bytes) => Some(bytes),
            Payload::Pending(_) => None,
        }
    }

    pub(crate) fn take_pending(&mut self) -> Option<Body> {
        match std::mem::replace(&mut self.payload, Payload::Buffered(Bytes::new())) {
            Payload::Pending(body) => Some(body),
            buffered => {
                self.payload = buffered;
                None
            }
        }
    }

    pub(crate) fn set_buffered(&mut self, bytes: Bytes) {
        self.payload = Payload::Buffered(bytes);
    }

    /// Replace the buffered body, keeping `Content-Length` in step.
    pub fn replace_body(&mut self, bytes: Bytes) {
        self.parts
            .headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
        self.payload = Payload::Buffered(bytes);
    }

    /// Rewrite the query string from decoded pairs.
    pub fn replace_query(&mut self, pairs: &[(String, String)]) -> Result<(), axum::http::Error> {
        let path = self.parts.uri.path();
        let path_and_query = if pairs.is_empty() {
            PathAndQuery::try_from(path)?
        } else {
            PathAndQuery::try_from(format!("{path}?{}", encode_pairs(pairs)))?
        };
        let mut uri = self.parts.uri.clone().into_parts();
        uri.path_and_query = Some(path_and_query);
        self.parts.uri = Uri::from_parts(uri)?;
        Ok(())
    }

    /// Reassemble the request for the handler, with admission results
    /// attached as extensions.
    pub fn into_request(self) -> Request<Body> {
        let Admission {
            mut parts,
            payload,
            client,
            policy,
            session,
            identity,
            ..
        } = self;

        parts.extensions.insert(client);
        parts.extensions.insert(policy);
        if let Some(session) = session {
            parts.extensions.insert(session);
        }
        if let Some(identity) = identity {
            parts.extensions.insert(identity);
        }

        let body = match payload {
            Payload::Pending(body) => body,
            Payload::Buffered(bytes) => Body::from(bytes),
        };
        Request::from_parts(parts, body)
    }
}
