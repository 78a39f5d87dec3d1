//! Route lookup for admission policy.
//!
//! # Responsibilities
//! - Store compiled route declarations
//! - Look up the policy for a request line
//! - Fall back to an open policy for unknown routes
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan over routes (acceptable for typical route counts)
//! - First match wins (declaration order)

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::Method;

use crate::auth::Role;
use crate::routing::matcher::{AndMatcher, Matcher, MethodMatcher, PathPatternMatcher};
use crate::security::RateTier;

/// What a route declares about admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSpec {
    pub method: Method,
    pub path: String,
    /// Role whose credential the route requires, if any.
    pub required_role: Option<Role>,
    /// Whether failed credential submissions on this route count toward lockout.
    pub lockout: bool,
}

impl RouteSpec {
    pub fn open(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            required_role: None,
            lockout: false,
        }
    }

    pub fn gated(method: Method, path: impl Into<String>, role: Role) -> Self {
        Self {
            required_role: Some(role),
            ..Self::open(method, path)
        }
    }

    pub fn credential_submission(method: Method, path: impl Into<String>) -> Self {
        Self {
            lockout: true,
            ..Self::open(method, path)
        }
    }
}

/// Resolved policy for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePolicy {
    pub spec: RouteSpec,
    /// Route-specific rate tier, checked before the default budget.
    pub rate_override: Option<RateTier>,
}

impl RoutePolicy {
    /// Policy for a request no route declares: default budget only.
    pub fn unmatched(method: Method, path: &str) -> Self {
        Self {
            spec: RouteSpec::open(method, path),
            rate_override: None,
        }
    }
}

/// Compiled route declarations.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<(AndMatcher, Arc<RoutePolicy>)>,
}

impl RouteTable {
    /// Compile declarations, attaching any rate override configured for the
    /// exact method and path.
    pub fn new(specs: &[RouteSpec], overrides: &HashMap<(Method, String), RateTier>) -> Self {
        let routes = specs
            .iter()
            .map(|spec| {
                let matcher = AndMatcher::new(vec![
                    Box::new(MethodMatcher::new(spec.method.clone())),
                    Box::new(PathPatternMatcher::new(&spec.path)),
                ]);
                let rate_override = overrides
                    .get(&(spec.method.clone(), spec.path.clone()))
                    .copied();
                let policy = RoutePolicy {
                    spec: spec.clone(),
                    rate_override,
                };
                (matcher, Arc::new(policy))
            })
            .collect();

        for (method, path) in overrides.keys() {
            if !specs.iter().any(|s| &s.method == method && &s.path == path) {
                tracing::warn!(%method, path, "Rate override does not name a declared route");
            }
        }

        Self { routes }
    }

    /// Policy declared for a request line, if any.
    pub fn match_route(&self, method: &Method, path: &str) -> Option<Arc<RoutePolicy>> {
        self.routes
            .iter()
            .find(|(matcher, _)| matcher.matches(method, path))
            .map(|(_, policy)| policy.clone())
    }

    /// Like [`match_route`](Self::match_route), falling back to an open policy.
    pub fn resolve(&self, method: &Method, path: &str) -> Arc<RoutePolicy> {
        self.match_route(method, path)
            .unwrap_or_else(|| Arc::new(RoutePolicy::unmatched(method.clone(), path)))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
