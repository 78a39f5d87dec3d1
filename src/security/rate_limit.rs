//! Tiered fixed-window rate limiting.
//!
//! Every client has one default budget shared by all routes. Routes with a
//! declared tier get a second, independent budget keyed by method and
//! route. The override is consulted first and the default only when the
//! override allows, so a request denied by its override never spends default
//! budget.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;

use crate::config::{RateLimitConfig, RateOverrideConfig};
use crate::resilience::with_deadline;
use crate::store::{SharedStore, StoreError};

/// One budget: `max_requests` per fixed `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateTier {
    pub max_requests: u64,
    pub window: Duration,
}

impl From<&RateOverrideConfig> for RateTier {
    fn from(config: &RateOverrideConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: Duration::from_millis(config.window_ms),
        }
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateDecision {
    Allow,
    Deny { message: String, retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allow)
    }
}

/// Parse configured overrides into a lookup keyed by method and route path.
pub fn override_table(config: &RateLimitConfig) -> HashMap<(Method, String), RateTier> {
    config
        .overrides
        .iter()
        .filter_map(|o| match Method::from_bytes(o.method.to_ascii_uppercase().as_bytes()) {
            Ok(method) => Some(((method, o.path.clone()), RateTier::from(o))),
            Err(_) => {
                tracing::warn!(method = %o.method, path = %o.path, "Ignoring override with invalid method");
                None
            }
        })
        .collect()
}

/// Rate limiter backed by the shared store.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn SharedStore>,
    enabled: bool,
    default: RateTier,
    deadline: Duration,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig, store: Arc<dyn SharedStore>, deadline: Duration) -> Self {
        Self {
            store,
            enabled: config.enabled,
            default: RateTier {
                max_requests: config.max_requests,
                window: Duration::from_millis(config.window_ms),
            },
            deadline,
        }
    }

    /// Spend one request of `client`'s budget on `route`, first against the
    /// route's own tier when it has one.
    pub async fn check(
        &self,
        method: &Method,
        route: &str,
        route_tier: Option<RateTier>,
        client: &str,
    ) -> Result<RateDecision, StoreError> {
        if !self.enabled {
            return Ok(RateDecision::Allow);
        }

        if let Some(tier) = route_tier {
            let key = override_key(method, route, client);
            let decision = self.spend(&key, tier).await?;
            if !decision.is_allowed() {
                tracing::warn!(client, %method, route, "Route rate limit exceeded");
                return Ok(decision);
            }
        }

        let decision = self.spend(&default_key(client), self.default).await?;
        if !decision.is_allowed() {
            tracing::warn!(client, "Default rate limit exceeded");
        }
        Ok(decision)
    }

    /// Requests counted against `client`'s default budget in the current window.
    pub async fn default_usage(&self, client: &str) -> Result<u64, StoreError> {
        with_deadline(self.deadline, self.store.counter(&default_key(client))).await
    }

    async fn spend(&self, key: &str, tier: RateTier) -> Result<RateDecision, StoreError> {
        let counter = with_deadline(self.deadline, self.store.increment(key, tier.window)).await?;
        if counter.hits <= tier.max_requests {
            return Ok(RateDecision::Allow);
        }
        Ok(RateDecision::Deny {
            message: format!(
                "We have received too many requests from this Address. Please try after {}.",
                humanize(counter.resets_in)
            ),
            retry_after: counter.resets_in,
        })
    }
}

fn default_key(client: &str) -> String {
    format!("rl:default:{client}")
}

fn override_key(method: &Method, route: &str, client: &str) -> String {
    format!("rl:{method}:{route}:{client}")
}

/// Coarse, rounded-up rendering of a wait time.
fn humanize(wait: Duration) -> String {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    let (amount, unit) = match secs {
        0 | 1 => return "1 second".to_string(),
        s if s < 60 => (s, "second"),
        s if s < 3600 => (s.div_ceil(60), "minute"),
        s => (s.div_ceil(3600), "hour"),
    };
    if amount == 1 {
        format!("1 {unit}")
    } else {
        format!("{amount} {unit}s")
    }
}
