//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files; the
//! loader overlays environment variables on top before validation.

use serde::{Deserialize, Serialize};

use crate::auth::Role;

/// Root configuration for the storefront gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, port sharing).
    pub listener: ListenerConfig,

    /// Worker process topology.
    pub workers: WorkerConfig,

    /// Shared state backend (sessions, counters, identities).
    pub store: StoreConfig,

    /// Session cookie and record lifetime.
    pub session: SessionConfig,

    /// Cookie attributes shared by session and credential cookies.
    pub cookies: CookieConfig,

    /// Per-role credential channels.
    pub auth: AuthConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Brute-force lockout around credential submission routes.
    pub lockout: LockoutConfig,

    /// Overload shedding.
    pub overload: OverloadConfig,

    /// Request size limits.
    pub limits: LimitsConfig,

    /// Input sanitization and parameter pollution guard.
    pub sanitize: SanitizeConfig,

    /// Response compression.
    pub compression: CompressionConfig,

    /// Cross-origin policy.
    pub cors: CorsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,

    /// Bind with SO_REUSEPORT so every worker can own the same port.
    pub reuse_port: bool,

    /// Accept backlog passed to listen(2).
    pub backlog: u32,

    /// Request timeout (total time for request/response) in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            reuse_port: true,
            backlog: 1024,
            request_timeout_secs: 30,
        }
    }
}

/// Worker process configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of workers. `None` means one per available CPU.
    pub count: Option<usize>,

    /// Base delay before respawning a crashed worker, in milliseconds.
    pub respawn_base_delay_ms: u64,

    /// Upper bound for the respawn delay, in milliseconds.
    pub respawn_max_delay_ms: u64,

    /// How long a worker must stay up before its crash counter resets.
    pub stable_after_secs: u64,

    /// Grace period for workers to exit on shutdown before they are killed.
    pub shutdown_grace_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: None,
            respawn_base_delay_ms: 100,
            respawn_max_delay_ms: 5_000,
            stable_after_secs: 30,
            shutdown_grace_secs: 10,
        }
    }
}

impl WorkerConfig {
    /// Resolve the effective worker count.
    pub fn effective_count(&self) -> usize {
        self.count.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

/// Shared store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Connection string: `memory://` or `redis://host:port/db`.
    pub url: String,

    /// Deadline applied to every store call, in milliseconds.
    pub timeout_ms: u64,

    /// Interval for sweeping expired entries from the memory backend.
    pub sweep_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "memory://".to_string(),
            timeout_ms: 500,
            sweep_interval_secs: 60,
        }
    }
}

/// Session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Secret used to sign session ids. Must be injected.
    pub secret: String,

    /// Session cookie name.
    pub cookie_name: String,

    /// Session lifetime in seconds.
    pub ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            cookie_name: "sid".to_string(),
            ttl_secs: 60 * 60,
        }
    }
}

/// Cookie attributes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CookieConfig {
    /// Emit the `Secure` attribute.
    pub secure: bool,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self { secure: true }
    }
}

/// One role's credential channel settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoleConfig {
    /// HMAC secret for this role's credentials. Must be injected.
    pub secret: String,

    /// Credential lifetime in seconds.
    pub expires_secs: u64,
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            expires_secs: 7 * 24 * 60 * 60,
        }
    }
}

/// Argon2id cost parameters for stored passwords.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PasswordConfig {
    /// Memory cost in KiB.
    pub memory_kib: u32,

    /// Number of passes.
    pub iterations: u32,

    /// Degree of parallelism.
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Per-role credential configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    pub user: RoleConfig,
    pub admin: RoleConfig,
    pub instructor: RoleConfig,
    pub doctor: RoleConfig,
    pub password: PasswordConfig,
}

impl AuthConfig {
    pub fn for_role(&self, role: Role) -> &RoleConfig {
        match role {
            Role::User => &self.user,
            Role::Admin => &self.admin,
            Role::Instructor => &self.instructor,
            Role::Doctor => &self.doctor,
        }
    }

    pub fn for_role_mut(&mut self, role: Role) -> &mut RoleConfig {
        match role {
            Role::User => &mut self.user,
            Role::Admin => &mut self.admin,
            Role::Instructor => &mut self.instructor,
            Role::Doctor => &mut self.doctor,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Maximum requests per client per window across the whole API.
    pub max_requests: u64,

    /// Default window length in milliseconds.
    pub window_ms: u64,

    /// Stricter per-route limits, tracked independently of the default.
    pub overrides: Vec<RateOverrideConfig>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 1_000,
            window_ms: 60 * 60 * 1_000,
            overrides: vec![RateOverrideConfig {
                method: "POST".to_string(),
                path: "/api/v1/user/loginUser".to_string(),
                max_requests: 5,
                window_ms: 500,
            }],
        }
    }
}

/// A per-route rate limit override.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RateOverrideConfig {
    /// HTTP method the override applies to.
    pub method: String,

    /// Route path pattern, exactly as declared (e.g. `/api/v1/user/loginUser`).
    pub path: String,

    /// Maximum requests per window.
    pub max_requests: u64,

    /// Window length in milliseconds.
    pub window_ms: u64,
}

/// Lockout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LockoutConfig {
    /// Enable brute-force lockout.
    pub enabled: bool,

    /// Failed credential checks allowed within a window.
    pub max_failures: u64,

    /// Window length in seconds, measured from the first failure.
    pub window_secs: u64,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_failures: 5,
            window_secs: 15 * 60,
        }
    }
}

/// Overload monitor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OverloadConfig {
    /// Enable load shedding.
    pub enabled: bool,

    /// Sampling interval in milliseconds.
    pub sample_interval_ms: u64,

    /// Smoothed lag above which the worker reports busy, in milliseconds.
    pub max_lag_ms: u64,
}

impl Default for OverloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_interval_ms: 250,
            max_lag_ms: 10,
        }
    }
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 5 * 1024,
        }
    }
}

/// Sanitization configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SanitizeConfig {
    /// Enable operator-injection and script stripping.
    pub enabled: bool,

    /// Query keys allowed to repeat; all others collapse to their last value.
    pub pollution_allow_list: Vec<String>,
}

impl Default for SanitizeConfig {
    fn default() -> Self {
        let allow = [
            "category",
            "brand",
            "price",
            "rating",
            "discount",
            "color",
            "weight",
            "stock",
            "review",
            "description",
            "features",
            "warranty",
        ];
        Self {
            enabled: true,
            pollution_allow_list: allow.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Compression configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Enable gzip response compression.
    pub enabled: bool,

    /// Compression level (1-9).
    pub level: i32,

    /// Responses smaller than this are sent uncompressed.
    pub min_size_bytes: u16,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: 6,
            min_size_bytes: 10_000,
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CorsConfig {
    /// Origins allowed to make credentialed requests.
    pub allowed_origins: Vec<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address. Workers add their id to the port.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
