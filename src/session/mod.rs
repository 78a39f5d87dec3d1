//! Sessions shared by every worker.
//!
//! The session id travels in a signed cookie (`{id}.{mac}`, where the mac is
//! hex HMAC-SHA256 of the id under the session secret). A cookie with a bad
//! mac is treated as absent. The record itself lives in the shared store under
//! `sess:{id}` with a TTL counted from creation; saving a record never
//! extends its lifetime.

use std::sync::Arc;
use std::time::Duration;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::auth::token::unix_now;
use crate::config::{CookieConfig, SessionConfig};
use crate::http::cookies::{CookieJar, SetCookie};
use crate::resilience::with_deadline;
use crate::store::{SharedStore, StoreError};

/// Per-visitor state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Unix seconds at creation.
    pub created_at: u64,
    /// Set once the visitor has passed a credential check.
    #[serde(default)]
    pub visited: bool,
    /// Expected answer to the outstanding captcha challenge.
    #[serde(default)]
    pub captcha: Option<String>,
}

/// A loaded session, attached to the request for handlers.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: String,
    pub record: SessionRecord,
    /// Created by this request; the response must carry the cookie.
    pub is_new: bool,
}

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session secret rejected: {0}")]
    Secret(String),
}

pub struct SessionManager {
    store: Arc<dyn SharedStore>,
    signer: HmacSha256,
    cookie_name: String,
    ttl: Duration,
    secure: bool,
    deadline: Duration,
}

impl SessionManager {
    pub fn new(
        config: &SessionConfig,
        cookies: &CookieConfig,
        store: Arc<dyn SharedStore>,
        deadline: Duration,
    ) -> Result<Self, SessionError> {
        let signer = HmacSha256::new_from_slice(config.secret.as_bytes())
            .map_err(|e| SessionError::Secret(e.to_string()))?;
        Ok(Self {
            store,
            signer,
            cookie_name: config.cookie_name.clone(),
            ttl: Duration::from_secs(config.ttl_secs),
            secure: cookies.secure,
            deadline,
        })
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    fn key(id: &str) -> String {
        format!("sess:{id}")
    }

    fn mac(&self, id: &str) -> HmacSha256 {
        let mut mac = self.signer.clone();
        mac.update(id.as_bytes());
        mac
    }

    /// Cookie value carrying a signed session id.
    pub fn sign(&self, id: &str) -> String {
        format!("{id}.{}", hex::encode(self.mac(id).finalize().into_bytes()))
    }

    /// Session id from a cookie value, if its mac checks out.
    pub fn unsign<'a>(&self, value: &'a str) -> Option<&'a str> {
        let (id, tag) = value.rsplit_once('.')?;
        if id.is_empty() {
            return None;
        }
        let tag = hex::decode(tag).ok()?;
        self.mac(id).verify_slice(&tag).ok().map(|()| id)
    }

    /// Load the request's session, creating and persisting a new one when the
    /// cookie is missing, forged, or points at an expired record.
    pub async fn load_or_create(&self, cookies: &CookieJar) -> Result<SessionHandle, StoreError> {
        if let Some(id) = cookies.get(&self.cookie_name).and_then(|v| self.unsign(v)) {
            if let Some(record) = self.load(id).await? {
                return Ok(SessionHandle {
                    id: id.to_string(),
                    record,
                    is_new: false,
                });
            }
            tracing::debug!(session = id, "Session expired or unknown, starting a new one");
        }

        let handle = SessionHandle {
            id: Uuid::new_v4().to_string(),
            record: SessionRecord {
                created_at: unix_now(),
                ..SessionRecord::default()
            },
            is_new: true,
        };
        self.save(&handle).await?;
        Ok(handle)
    }

    async fn load(&self, id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let key = Self::key(id);
        let raw = with_deadline(self.deadline, self.store.get(&key)).await?;
        raw.map(|raw| {
            serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
                key,
                reason: e.to_string(),
            })
        })
        .transpose()
    }

    /// Persist the record for the rest of its lifetime.
    pub async fn save(&self, handle: &SessionHandle) -> Result<(), StoreError> {
        let remaining = self.remaining(&handle.record);
        if remaining.is_zero() {
            return self.destroy(&handle.id).await;
        }
        let key = Self::key(&handle.id);
        let raw = serde_json::to_string(&handle.record).map_err(|e| StoreError::Corrupt {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        with_deadline(self.deadline, self.store.set(&key, &raw, Some(remaining))).await
    }

    pub async fn destroy(&self, id: &str) -> Result<(), StoreError> {
        with_deadline(self.deadline, self.store.delete(&Self::key(id))).await
    }

    fn remaining(&self, record: &SessionRecord) -> Duration {
        let age = Duration::from_secs(unix_now().saturating_sub(record.created_at));
        self.ttl.saturating_sub(age)
    }

    /// `Set-Cookie` for a session created by this request.
    pub fn cookie(&self, handle: &SessionHandle) -> SetCookie<'_> {
        SetCookie::new(&self.cookie_name, self.sign(&handle.id))
            .max_age(self.remaining(&handle.record))
            .secure(self.secure)
    }

    /// `Set-Cookie` that removes the session cookie.
    pub fn clear_cookie(&self) -> SetCookie<'_> {
        SetCookie::expired(&self.cookie_name).secure(self.secure)
    }
}
