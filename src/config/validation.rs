//! Configuration validation.
//!
//! Serde handles syntax; this module checks semantics and value ranges.
//! Every problem is reported, not just the first.

use std::fmt;
use std::net::SocketAddr;

use axum::http::Method;

use crate::auth::Role;
use crate::config::schema::GatewayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Validate a loaded configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.request_timeout_secs", "must be > 0"));
    }
    if config.workers.count == Some(0) {
        errors.push(ValidationError::new("workers.count", "must be > 0"));
    }

    match url::Url::parse(&config.store.url) {
        Ok(url) if matches!(url.scheme(), "memory" | "redis" | "rediss") => {}
        Ok(url) => errors.push(ValidationError::new(
            "store.url",
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new("store.url", e.to_string())),
    }
    if config.store.timeout_ms == 0 {
        errors.push(ValidationError::new("store.timeout_ms", "must be > 0"));
    }

    if config.session.secret.is_empty() {
        errors.push(ValidationError::new("session.secret", "missing (set SESSION_SECRET)"));
    }
    if config.session.ttl_secs == 0 {
        errors.push(ValidationError::new("session.ttl_secs", "must be > 0"));
    }

    for role in Role::ALL {
        let channel = config.auth.for_role(role);
        let field = format!("auth.{}", role.as_str().to_lowercase());
        if channel.secret.is_empty() {
            errors.push(ValidationError::new(
                format!("{field}.secret"),
                format!("missing (set JWT_SECRET{})", role.env_suffix()),
            ));
        }
        if channel.expires_secs == 0 {
            errors.push(ValidationError::new(format!("{field}.expires_secs"), "must be > 0"));
        }
    }
    for (i, a) in Role::ALL.iter().enumerate() {
        for b in &Role::ALL[i + 1..] {
            let (sa, sb) = (&config.auth.for_role(*a).secret, &config.auth.for_role(*b).secret);
            if !sa.is_empty() && sa == sb {
                errors.push(ValidationError::new(
                    "auth",
                    format!("{} and {} share a signing secret", a.as_str(), b.as_str()),
                ));
            }
        }
    }

    let password = &config.auth.password;
    if password.iterations == 0 || password.parallelism == 0 {
        errors.push(ValidationError::new(
            "auth.password",
            "iterations and parallelism must be > 0",
        ));
    } else if password.memory_kib < 8 * password.parallelism {
        errors.push(ValidationError::new(
            "auth.password.memory_kib",
            "must be at least 8 KiB per lane",
        ));
    }

    if config.rate_limit.max_requests == 0 || config.rate_limit.window_ms == 0 {
        errors.push(ValidationError::new("rate_limit", "max_requests and window_ms must be > 0"));
    }
    for (i, o) in config.rate_limit.overrides.iter().enumerate() {
        let field = format!("rate_limit.overrides[{i}]");
        if Method::from_bytes(o.method.as_bytes()).is_err() {
            errors.push(ValidationError::new(&field, format!("invalid method '{}'", o.method)));
        }
        if !o.path.starts_with('/') {
            errors.push(ValidationError::new(&field, "path must start with '/'"));
        }
        if o.max_requests == 0 || o.window_ms == 0 {
            errors.push(ValidationError::new(&field, "max_requests and window_ms must be > 0"));
        }
    }

    if config.lockout.max_failures == 0 || config.lockout.window_secs == 0 {
        errors.push(ValidationError::new("lockout", "max_failures and window_secs must be > 0"));
    }
    if config.overload.sample_interval_ms == 0 {
        errors.push(ValidationError::new("overload.sample_interval_ms", "must be > 0"));
    }
    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::new("limits.max_body_bytes", "must be > 0"));
    }
    if !(1..=9).contains(&config.compression.level) {
        errors.push(ValidationError::new("compression.level", "must be between 1 and 9"));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "not a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
