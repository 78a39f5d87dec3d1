//! Identity records and the directory that resolves them.
//!
//! The directory stands in for the user document store: the pipeline only
//! ever asks it to resolve a subject id to an [`Identity`], while the account
//! handlers use it to register accounts and look up password hashes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::resilience::with_deadline;
use crate::store::{SharedStore, StoreError};

/// An authenticated principal. Attached to requests that pass verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub role: Role,
    pub name: String,
    pub email: String,
}

/// Stored form of an identity, including credential material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    #[serde(flatten)]
    pub identity: Identity,
    /// Argon2id PHC string.
    password_hash: String,
}

impl IdentityRecord {
    pub fn new(identity: Identity, password_hash: String) -> Self {
        Self {
            identity,
            password_hash,
        }
    }

    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("an account with this email already exists")]
    EmailTaken,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Lookup and registration of identities.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Identity>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<IdentityRecord>, StoreError>;

    async fn register(&self, record: IdentityRecord) -> Result<Identity, RegisterError>;
}

/// Identity directory kept in the shared store.
///
/// Every store call is bounded by `deadline`; a stall surfaces as
/// [`StoreError::Timeout`].
pub struct StoredIdentities {
    store: Arc<dyn SharedStore>,
    deadline: Duration,
}

impl StoredIdentities {
    pub fn new(store: Arc<dyn SharedStore>, deadline: Duration) -> Self {
        Self { store, deadline }
    }

    fn record_key(id: &str) -> String {
        format!("identity:{id}")
    }

    fn email_key(email: &str) -> String {
        format!("identity-email:{}", email.trim().to_lowercase())
    }

    async fn load(&self, id: &str) -> Result<Option<IdentityRecord>, StoreError> {
        let key = Self::record_key(id);
        match with_deadline(self.deadline, self.store.get(&key)).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::Corrupt {
                    key,
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl IdentityStore for StoredIdentities {
    async fn find_by_id(&self, id: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self.load(id).await?.map(|record| record.identity))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<IdentityRecord>, StoreError> {
        match with_deadline(self.deadline, self.store.get(&Self::email_key(email))).await? {
            Some(id) => self.load(&id).await,
            None => Ok(None),
        }
    }

    async fn register(&self, record: IdentityRecord) -> Result<Identity, RegisterError> {
        let id = record.identity.id.clone();
        let email_key = Self::email_key(&record.identity.email);
        let raw = serde_json::to_string(&record).map_err(|e| StoreError::Corrupt {
            key: Self::record_key(&id),
            reason: e.to_string(),
        })?;

        if !with_deadline(self.deadline, self.store.insert_new(&email_key, &id)).await? {
            return Err(RegisterError::EmailTaken);
        }
        let written =
            with_deadline(self.deadline, self.store.set(&Self::record_key(&id), &raw, None)).await;
        if let Err(e) = written {
            // Free the email so the account can be registered again.
            if let Err(cleanup) = with_deadline(self.deadline, self.store.delete(&email_key)).await {
                tracing::error!(identity = %id, error = %cleanup, "Failed to release email claim");
            }
            return Err(e.into());
        }

        tracing::info!(identity = %id, role = %record.identity.role, "Identity registered");
        Ok(record.identity)
    }
}
