//! Request admission pipeline.
//!
//! # Data Flow
//! ```text
//! Request
//!     → Overload       (shed when the worker lags; touches nothing else)
//!     → BodyLimit      (buffer body up to the cap)
//!     → Sanitize       (operator keys, script markup)
//!     → Pollution      (collapse duplicate query keys)
//!     → Compression    (honour x-no-compression)
//!     → RateLimit      (route tier, then default budget)
//!     → Session        (load or create, once per request)
//!     → Lockout        (reserve a credential attempt)
//!     → Verify         (routes gated on a role)
//!     → handler
//!     → settle         (keep, clear or release the attempt; session cookie)
//! ```
//!
//! The stages are a list of data driven by one loop. Each stage returns a
//! [`Verdict`]; the first rejection ends admission and becomes the response.

pub mod context;
pub mod verdict;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderName};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::auth::RoleVerifier;
use crate::config::GatewayConfig;
use crate::observability::metrics;
use crate::routing::RouteTable;
use crate::security::limits::{self, BodyLimitError};
use crate::security::pollution::collapse_duplicates;
use crate::security::sanitize::{self, BodyKind};
use crate::security::{LockoutTracker, OverloadMonitor, RateDecision, RateLimiter};
use crate::session::SessionManager;

pub use context::{Admission, ClientKey};
pub use verdict::{Rejection, Verdict};

/// Request header that opts the response out of compression.
pub const X_NO_COMPRESSION: HeaderName = HeaderName::from_static("x-no-compression");

/// One admission step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Overload,
    BodyLimit,
    Sanitize,
    ParameterPollution,
    Compression,
    RateLimit,
    Session,
    Lockout,
    Verify,
}

impl Stage {
    /// Every stage, in the order they run.
    pub const ORDER: [Stage; 9] = [
        Stage::Overload,
        Stage::BodyLimit,
        Stage::Sanitize,
        Stage::ParameterPollution,
        Stage::Compression,
        Stage::RateLimit,
        Stage::Session,
        Stage::Lockout,
        Stage::Verify,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Overload => "overload",
            Stage::BodyLimit => "body_limit",
            Stage::Sanitize => "sanitize",
            Stage::ParameterPollution => "parameter_pollution",
            Stage::Compression => "compression",
            Stage::RateLimit => "rate_limit",
            Stage::Session => "session",
            Stage::Lockout => "lockout",
            Stage::Verify => "verify",
        }
    }
}

/// Everything the stages need, shared by all requests on a worker.
pub struct PipelineParts {
    pub overload: OverloadMonitor,
    pub limiter: RateLimiter,
    pub lockout: LockoutTracker,
    pub verifier: RoleVerifier,
    pub sessions: Arc<SessionManager>,
    pub routes: Arc<RouteTable>,
}

struct PipelineInner {
    stages: Vec<Stage>,
    parts: PipelineParts,
    max_body_bytes: usize,
    pollution_allow_list: HashSet<String>,
}

/// The admission pipeline. Cloning shares the same state.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<PipelineInner>,
}

impl Pipeline {
    pub fn new(config: &GatewayConfig, parts: PipelineParts) -> Self {
        let stages = Stage::ORDER
            .into_iter()
            .filter(|stage| match stage {
                Stage::Overload => config.overload.enabled,
                Stage::Sanitize | Stage::ParameterPollution => config.sanitize.enabled,
                Stage::RateLimit => config.rate_limit.enabled,
                Stage::Lockout => config.lockout.enabled,
                _ => true,
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            stages = ?stages.iter().map(Stage::name).collect::<Vec<_>>(),
            "Admission pipeline assembled"
        );

        Self {
            inner: Arc::new(PipelineInner {
                stages,
                parts,
                max_body_bytes: config.limits.max_body_bytes,
                pollution_allow_list: config.sanitize.pollution_allow_list.iter().cloned().collect(),
            }),
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.inner.stages
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.inner.parts.sessions
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.inner.parts.limiter
    }

    pub fn lockout(&self) -> &LockoutTracker {
        &self.inner.parts.lockout
    }

    /// Run every stage in order, stopping at the first rejection.
    pub async fn admit(&self, admission: &mut Admission) -> Result<(), Rejection> {
        for &stage in &self.inner.stages {
            if let Verdict::Reject(rejection) = self.run_stage(stage, admission).await {
                tracing::info!(
                    stage = stage.name(),
                    client = admission.client.as_str(),
                    method = %admission.parts.method,
                    path = admission.parts.uri.path(),
                    status = rejection.status().as_u16(),
                    reason = %rejection,
                    "Request rejected"
                );
                return Err(rejection);
            }
        }
        Ok(())
    }

    async fn run_stage(&self, stage: Stage, admission: &mut Admission) -> Verdict {
        match stage {
            Stage::Overload => self.check_overload().into(),
            Stage::BodyLimit => self.limit_body(admission).await.into(),
            Stage::Sanitize => self.sanitize(admission).into(),
            Stage::ParameterPollution => self.collapse_query(admission).into(),
            Stage::Compression => {
                negotiate_compression(&mut admission.parts.headers);
                Verdict::Continue
            }
            Stage::RateLimit => self.rate_limit(admission).await.into(),
            Stage::Session => self.load_session(admission).await.into(),
            Stage::Lockout => self.check_lockout(admission).await.into(),
            Stage::Verify => self.verify(admission).await.into(),
        }
    }

    fn check_overload(&self) -> Result<(), Rejection> {
        if self.inner.parts.overload.is_busy() {
            return Err(Rejection::Overloaded);
        }
        Ok(())
    }

    async fn limit_body(&self, admission: &mut Admission) -> Result<(), Rejection> {
        let limit = self.inner.max_body_bytes;
        let too_large = |e: BodyLimitError| match e {
            BodyLimitError::TooLarge { limit } => Rejection::PayloadTooLarge { limit },
            BodyLimitError::Read(reason) => Rejection::MalformedBody(reason),
        };

        limits::check_declared(&admission.parts.headers, limit).map_err(too_large)?;
        if let Some(body) = admission.take_pending() {
            let bytes = limits::read_capped(body, limit).await.map_err(too_large)?;
            admission.set_buffered(bytes);
        }
        Ok(())
    }

    fn sanitize(&self, admission: &mut Admission) -> Result<(), Rejection> {
        let kind = BodyKind::from_content_type(
            admission
                .parts
                .headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
        );
        let cleaned = match admission.body() {
            Some(body) => sanitize::sanitize_body(kind, body)
                .map_err(|e| Rejection::MalformedBody(e.to_string()))?,
            None => None,
        };
        if let Some(cleaned) = cleaned {
            tracing::debug!(client = admission.client.as_str(), "Request body sanitized");
            admission.replace_body(cleaned);
        }

        if let Some(query) = admission.parts.uri.query() {
            let (pairs, changed) = sanitize::sanitize_pairs(sanitize::parse_pairs(query));
            if changed {
                admission
                    .replace_query(&pairs)
                    .map_err(|e| Rejection::MalformedBody(e.to_string()))?;
            }
        }
        Ok(())
    }

    fn collapse_query(&self, admission: &mut Admission) -> Result<(), Rejection> {
        let Some(query) = admission.parts.uri.query() else {
            return Ok(());
        };
        let (pairs, changed) =
            collapse_duplicates(sanitize::parse_pairs(query), &self.inner.pollution_allow_list);
        if changed {
            admission
                .replace_query(&pairs)
                .map_err(|e| Rejection::MalformedBody(e.to_string()))?;
        }
        Ok(())
    }

    async fn rate_limit(&self, admission: &mut Admission) -> Result<(), Rejection> {
        let policy = &admission.policy;
        let decision = self
            .inner
            .parts
            .limiter
            .check(
                &policy.spec.method,
                &policy.spec.path,
                policy.rate_override,
                admission.client.as_str(),
            )
            .await?;
        match decision {
            RateDecision::Allow => Ok(()),
            RateDecision::Deny { message, retry_after } => {
                Err(Rejection::RateLimited { message, retry_after })
            }
        }
    }

    async fn load_session(&self, admission: &mut Admission) -> Result<(), Rejection> {
        let session = self
            .inner
            .parts
            .sessions
            .load_or_create(&admission.cookies)
            .await?;
        admission.session = Some(session);
        Ok(())
    }

    async fn check_lockout(&self, admission: &mut Admission) -> Result<(), Rejection> {
        if !admission.policy.spec.lockout {
            return Ok(());
        }
        if !self
            .inner
            .parts
            .lockout
            .begin_attempt(admission.client.as_str())
            .await?
        {
            return Err(Rejection::Locked);
        }
        admission.attempt_reserved = true;
        Ok(())
    }

    async fn verify(&self, admission: &mut Admission) -> Result<(), Rejection> {
        let Some(role) = admission.policy.spec.required_role else {
            return Ok(());
        };
        let identity = self
            .inner
            .parts
            .verifier
            .verify(&admission.cookies, role)
            .await?;

        if let Some(session) = admission.session.as_mut() {
            if !session.record.visited {
                session.record.visited = true;
                self.inner.parts.sessions.save(session).await?;
            }
        }
        admission.identity = Some(identity);
        Ok(())
    }

    /// Hand back a lockout slot for a request a later stage turned away.
    // Reads what it needs from the admission up front: `Admission` owns the
    // request body, which is not `Sync`, so a borrow of it cannot be held
    // across an await in a `Send` future.
    fn abandon(
        &self,
        admission: &Admission,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        let reserved = admission.attempt_reserved;
        let client = admission.client.clone();
        async move {
            if !reserved {
                return;
            }
            let client = client.as_str();
            if let Err(e) = self.inner.parts.lockout.release_attempt(client).await {
                tracing::error!(client, error = %e, "Failed to release lockout slot");
            }
        }
    }

    /// Post-handler bookkeeping: lockout accounting and the session cookie.
    async fn settle(&self, admitted: &Settlement, response: &mut Response) {
        let status = response.status();
        if admitted.attempt_reserved {
            let lockout = &self.inner.parts.lockout;
            let client = admitted.client.as_str();
            // A 401 keeps the slot reserved at admission as the failure.
            let result = if status == axum::http::StatusCode::UNAUTHORIZED {
                Ok(())
            } else if status.is_success() {
                lockout.record_success(client).await
            } else {
                lockout.release_attempt(client).await
            };
            if let Err(e) = result {
                tracing::error!(client, error = %e, "Failed to update lockout counter");
            }
        }

        if let Some(session) = &admitted.new_session {
            let sessions = &self.inner.parts.sessions;
            if !sets_cookie(response.headers(), sessions.cookie_name()) {
                sessions.cookie(session).append_to(response.headers_mut());
            }
        }
    }
}

/// What [`Pipeline::settle`] needs once the request has moved into the handler.
struct Settlement {
    client: ClientKey,
    attempt_reserved: bool,
    new_session: Option<crate::session::SessionHandle>,
}

impl Settlement {
    fn of(admission: &Admission) -> Self {
        Self {
            client: admission.client.clone(),
            attempt_reserved: admission.attempt_reserved,
            new_session: admission.session.clone().filter(|s| s.is_new),
        }
    }
}

/// Drop `Accept-Encoding` when the client asked for an uncompressed response,
/// so the compression layer leaves the body alone.
fn negotiate_compression(headers: &mut HeaderMap) {
    if headers.contains_key(&X_NO_COMPRESSION) {
        headers.remove(header::ACCEPT_ENCODING);
    }
}

fn sets_cookie(headers: &HeaderMap, name: &str) -> bool {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.split_once('=').is_some_and(|(n, _)| n.trim() == name))
}

/// Axum middleware running the pipeline in front of the handlers.
pub async fn admission_middleware(
    State(pipeline): State<Pipeline>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let start_time = Instant::now();
    let policy = pipeline
        .inner
        .parts
        .routes
        .resolve(request.method(), request.uri().path());
    let mut admission = Admission::new(request, policy);

    if let Err(rejection) = pipeline.admit(&mut admission).await {
        pipeline.abandon(&admission).await;
        metrics::record_rejection(rejection.reason());
        let response = rejection.into_response();
        metrics::record_request(response.status().as_u16(), start_time);
        return response;
    }

    let settlement = Settlement::of(&admission);
    let mut response = next.run(admission.into_request()).await;
    pipeline.settle(&settlement, &mut response).await;
    metrics::record_request(response.status().as_u16(), start_time);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_stage_order() {
        let names: Vec<_> = Stage::ORDER.iter().map(Stage::name).collect();
        assert_eq!(
            names,
            [
                "overload",
                "body_limit",
                "sanitize",
                "parameter_pollution",
                "compression",
                "rate_limit",
                "session",
                "lockout",
                "verify"
            ]
        );
    }

    #[test]
    fn test_no_compression_header_drops_accept_encoding() {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
        negotiate_compression(&mut headers);
        assert!(headers.contains_key(header::ACCEPT_ENCODING));

        headers.insert(X_NO_COMPRESSION, HeaderValue::from_static("1"));
        negotiate_compression(&mut headers);
        assert!(!headers.contains_key(header::ACCEPT_ENCODING));
    }

    #[test]
    fn test_sets_cookie_detection() {
        let mut headers = HeaderMap::new();
        headers.append(header::SET_COOKIE, HeaderValue::from_static("tokenu=abc; Path=/"));
        assert!(!sets_cookie(&headers, "sid"));
        headers.append(header::SET_COOKIE, HeaderValue::from_static("sid=; Max-Age=0"));
        assert!(sets_cookie(&headers, "sid"));
    }
}
