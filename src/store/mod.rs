//! Shared state store.
//!
//! Session records, rate-limit and lockout counters, and identity records
//! live here rather than in worker memory, so every worker process behind the
//! shared port sees the same state.
//!
//! # Key Patterns
//! ```text
//! sess:{session_id}            → SessionRecord JSON (TTL = session lifetime)
//! rl:default:{client}          → default-tier counter (TTL = window)
//! rl:{method}:{route}:{client} → override-tier counter (TTL = override window)
//! lockout:{client}             → credential attempts (TTL = lockout window)
//! identity:{id}                → IdentityRecord JSON
//! identity-email:{email}       → identity id
//! ```
//!
//! # Design Decisions
//! - Counters are increment-then-compare in one atomic store operation
//! - The counter TTL is set by the increment that creates the key, so a
//!   window starts at its first hit and is never extended
//! - The memory backend is worker-local; behind N workers every threshold
//!   is effectively multiplied by N. Use the Redis backend for global limits.

pub mod memory;
pub mod redis;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Failure talking to the shared store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("corrupt store value at {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// State of a windowed counter after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counter {
    /// Hits recorded in the current window, including this one.
    pub hits: u64,
    /// Time until the window closes and the counter resets.
    pub resets_in: Duration,
}

/// Key-value store shared by every worker.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Atomically increment `key`, creating it with `window` TTL if absent.
    async fn increment(&self, key: &str, window: Duration) -> Result<Counter, StoreError>;

    /// Undo one increment of a live counter. Never goes below zero and
    /// never creates or extends the key.
    async fn release(&self, key: &str) -> Result<(), StoreError>;

    /// Current value of a counter; zero if absent or expired.
    async fn counter(&self, key: &str) -> Result<u64, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value`, replacing any existing entry. `None` means no expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Store `value` only if `key` is absent. Returns whether it was written.
    async fn insert_new(&self, key: &str, value: &str) -> Result<bool, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Drop expired entries. Backends with native expiry do nothing.
    async fn sweep(&self) -> Result<usize, StoreError> {
        Ok(0)
    }

    /// Backend name for logs.
    fn backend(&self) -> &'static str;
}

/// Open the store named by a connection string.
pub async fn connect(url: &str) -> Result<Arc<dyn SharedStore>, StoreError> {
    if url.starts_with("redis://") || url.starts_with("rediss://") {
        let store = RedisStore::connect(url).await?;
        tracing::info!(backend = "redis", "Shared store connected");
        Ok(Arc::new(store))
    } else if url.starts_with("memory://") {
        tracing::warn!(
            backend = "memory",
            "Using worker-local store; counters and sessions are not shared across workers"
        );
        Ok(Arc::new(MemoryStore::new()))
    } else {
        Err(StoreError::Backend(format!("unsupported store url '{url}'")))
    }
}
