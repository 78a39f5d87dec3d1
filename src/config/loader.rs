//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use crate::auth::Role;
use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value for {var}: {reason}")]
    Env { var: &'static str, reason: String },
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration: optional TOML file, then environment, then validation.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => GatewayConfig::default(),
    };

    apply_env(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay environment-provided settings onto `config`.
///
/// `lookup` abstracts the environment so callers can inject variables.
pub fn apply_env<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    for role in Role::ALL {
        let suffix = role.env_suffix();
        if let Some(secret) = lookup(&format!("JWT_SECRET{suffix}")) {
            config.auth.for_role_mut(role).secret = secret;
        }
        if let Some(raw) = lookup(&format!("JWT_EXPIRES{suffix}")) {
            config.auth.for_role_mut(role).expires_secs =
                parse_number(role.expires_var(), &raw)?;
        }
    }

    if let Some(secret) = lookup("SESSION_SECRET") {
        config.session.secret = secret;
    }
    if let Some(url) = lookup("STORE_URL") {
        config.store.url = url;
    }
    if let Some(raw) = lookup("RATE_LIMIT_MAX") {
        config.rate_limit.max_requests = parse_number("RATE_LIMIT_MAX", &raw)?;
    }
    if let Some(raw) = lookup("RATE_LIMIT_WINDOW_MS") {
        config.rate_limit.window_ms = parse_number("RATE_LIMIT_WINDOW_MS", &raw)?;
    }
    if let Some(raw) = lookup("OVERLOAD_INTERVAL_MS") {
        config.overload.sample_interval_ms = parse_number("OVERLOAD_INTERVAL_MS", &raw)?;
    }
    if let Some(raw) = lookup("OVERLOAD_MAX_LAG_MS") {
        config.overload.max_lag_ms = parse_number("OVERLOAD_MAX_LAG_MS", &raw)?;
    }
    if let Some(raw) = lookup("PORT") {
        let port: u16 = parse_number("PORT", &raw)?;
        let host = config
            .listener
            .bind_address
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        config.listener.bind_address = format!("{host}:{port}");
    }

    for var in ["FRONTEND_URL", "DASHBOARD_URL"] {
        if let Some(origin) = lookup(var) {
            if !config.cors.allowed_origins.contains(&origin) {
                config.cors.allowed_origins.push(origin);
            }
        }
    }

    Ok(())
}

fn parse_number<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        var,
        reason: e.to_string(),
    })
}
