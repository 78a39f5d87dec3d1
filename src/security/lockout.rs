//! Brute-force lockout for credential submission routes.
//!
//! Failed credential checks are counted per client in a window that starts
//! at the first failure. Once the count reaches the threshold the client is
//! locked out until the window lapses, whether or not later credentials are
//! correct. A successful submission clears the counter.
//!
//! Admission reserves a slot with one atomic increment before the handler
//! runs, so concurrent submissions cannot all pass a read of the same count.
//! A 401 keeps the slot as a failure; any other outcome gives it back.

use std::sync::Arc;
use std::time::Duration;

use crate::config::LockoutConfig;
use crate::resilience::with_deadline;
use crate::store::{SharedStore, StoreError};

#[derive(Clone)]
pub struct LockoutTracker {
    store: Arc<dyn SharedStore>,
    enabled: bool,
    max_failures: u64,
    window: Duration,
    deadline: Duration,
}

impl LockoutTracker {
    pub fn new(config: &LockoutConfig, store: Arc<dyn SharedStore>, deadline: Duration) -> Self {
        Self {
            store,
            enabled: config.enabled,
            max_failures: config.max_failures,
            window: Duration::from_secs(config.window_secs),
            deadline,
        }
    }

    fn key(client: &str) -> String {
        format!("lockout:{client}")
    }

    /// Read-only; calling it repeatedly never changes the outcome.
    pub async fn is_locked(&self, client: &str) -> Result<bool, StoreError> {
        if !self.enabled {
            return Ok(false);
        }
        let failures = with_deadline(self.deadline, self.store.counter(&Self::key(client))).await?;
        Ok(failures >= self.max_failures)
    }

    /// Reserve a slot for one credential submission. `false` means the client
    /// is locked and the submission must not reach the handler.
    pub async fn begin_attempt(&self, client: &str) -> Result<bool, StoreError> {
        if !self.enabled {
            return Ok(true);
        }
        let counter =
            with_deadline(self.deadline, self.store.increment(&Self::key(client), self.window)).await?;
        if counter.hits > self.max_failures {
            tracing::debug!(client, attempts = counter.hits, "Credential attempt refused");
            return Ok(false);
        }
        if counter.hits == self.max_failures {
            tracing::warn!(
                client,
                failures = counter.hits,
                locked_for_secs = counter.resets_in.as_secs(),
                "Last credential attempt before lockout"
            );
        }
        Ok(true)
    }

    /// Give back a slot whose submission neither failed nor succeeded.
    pub async fn release_attempt(&self, client: &str) -> Result<(), StoreError> {
        if !self.enabled {
            return Ok(());
        }
        with_deadline(self.deadline, self.store.release(&Self::key(client))).await
    }

    /// Count one failed credential check. Returns the failures in the window.
    pub async fn record_failure(&self, client: &str) -> Result<u64, StoreError> {
        if !self.enabled {
            return Ok(0);
        }
        let counter =
            with_deadline(self.deadline, self.store.increment(&Self::key(client), self.window)).await?;
        if counter.hits == self.max_failures {
            tracing::warn!(
                client,
                failures = counter.hits,
                locked_for_secs = counter.resets_in.as_secs(),
                "Client locked out"
            );
        } else {
            tracing::debug!(client, failures = counter.hits, "Credential failure recorded");
        }
        Ok(counter.hits)
    }

    /// Clear the failure count after a successful credential check.
    pub async fn record_success(&self, client: &str) -> Result<(), StoreError> {
        if !self.enabled {
            return Ok(());
        }
        with_deadline(self.deadline, self.store.delete(&Self::key(client))).await
    }
}
