//! Role-scoped credential verification.
//!
//! Verification order, each step failing closed:
//! 1. the role's cookie is present
//! 2. the credential verifies under that role's secret and has not expired
//! 3. the subject resolves to a stored identity
//! 4. the identity's stored role is the role the route is gated for
//!
//! Steps 1-3 fail as `Unauthenticated`; step 4 fails as `Unauthorized`,
//! because the requester is known but not entitled.

use std::sync::Arc;
use std::time::Duration;

use crate::auth::identity::{Identity, IdentityStore};
use crate::auth::role::RoleTable;
use crate::auth::token::TokenError;
use crate::auth::Role;
use crate::http::cookies::CookieJar;
use crate::resilience::with_deadline;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Verifies credentials for any role against the shared role table.
#[derive(Clone)]
pub struct RoleVerifier {
    roles: Arc<RoleTable>,
    identities: Arc<dyn IdentityStore>,
    deadline: Duration,
}

impl RoleVerifier {
    pub fn new(
        roles: Arc<RoleTable>,
        identities: Arc<dyn IdentityStore>,
        deadline: Duration,
    ) -> Self {
        Self {
            roles,
            identities,
            deadline,
        }
    }

    pub async fn verify(&self, cookies: &CookieJar, expected: Role) -> Result<Identity, AuthError> {
        let channel = self.roles.channel(expected);

        let token = cookies.get(channel.cookie_name).ok_or_else(|| {
            AuthError::Unauthenticated(format!("{expected} Not Authenticated"))
        })?;

        let claims = channel.signer.decode(token).map_err(|e| {
            tracing::debug!(role = %expected, error = %e, "Credential rejected");
            match e {
                TokenError::Expired => {
                    AuthError::Unauthenticated(format!("{expected} session expired, please log in again"))
                }
                _ => AuthError::Unauthenticated(format!("{expected} Not Authenticated")),
            }
        })?;

        let identity = with_deadline(self.deadline, self.identities.find_by_id(&claims.sub))
            .await?
            .ok_or_else(|| {
                tracing::debug!(role = %expected, subject = %claims.sub, "Credential subject not found");
                AuthError::Unauthenticated(format!("{expected} Not Authenticated"))
            })?;

        if identity.role != expected {
            tracing::warn!(
                subject = %identity.id,
                held = %identity.role,
                required = %expected,
                "Role mismatch"
            );
            return Err(AuthError::Unauthorized(format!(
                "{} is not allowed to access this resource",
                identity.role
            )));
        }

        Ok(identity)
    }
}
