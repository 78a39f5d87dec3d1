//! The closed set of roles and their credential channels.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::token::{TokenError, TokenSigner};
use crate::config::AuthConfig;

/// Role held by an identity. Exactly one per identity, immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    User,
    Admin,
    Instructor,
    Doctor,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::User, Role::Admin, Role::Instructor, Role::Doctor];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Admin => "Admin",
            Role::Instructor => "Instructor",
            Role::Doctor => "Doctor",
        }
    }

    /// Credential cookie carrying this role's token.
    pub fn cookie_name(self) -> &'static str {
        match self {
            Role::User => "tokenu",
            Role::Admin => "tokena",
            Role::Instructor => "tokeni",
            Role::Doctor => "tokend",
        }
    }

    /// Suffix of the `JWT_SECRET*` / `JWT_EXPIRES*` environment variables.
    pub fn env_suffix(self) -> &'static str {
        match self {
            Role::User => "U",
            Role::Admin => "A",
            Role::Instructor => "I",
            Role::Doctor => "D",
        }
    }

    pub fn expires_var(self) -> &'static str {
        match self {
            Role::User => "JWT_EXPIRESU",
            Role::Admin => "JWT_EXPIRESA",
            Role::Instructor => "JWT_EXPIRESI",
            Role::Doctor => "JWT_EXPIRESD",
        }
    }

    /// Path segment of this role's account routes (`/api/v1/<slug>/...`).
    pub fn route_slug(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::Instructor => "instructor",
            Role::Doctor => "doctor",
        }
    }

    fn index(self) -> usize {
        match self {
            Role::User => 0,
            Role::Admin => 1,
            Role::Instructor => 2,
            Role::Doctor => 3,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown role '{s}'"))
    }
}

/// Everything needed to issue and check one role's credentials.
pub struct RoleChannel {
    pub role: Role,
    pub cookie_name: &'static str,
    pub signer: TokenSigner,
}

impl RoleChannel {
    pub fn expires_in(&self) -> Duration {
        self.signer.ttl()
    }
}

/// Role → channel lookup table, built once at startup.
pub struct RoleTable {
    channels: [RoleChannel; 4],
}

impl RoleTable {
    pub fn from_config(config: &AuthConfig) -> Self {
        let channel = |role: Role| {
            let settings = config.for_role(role);
            RoleChannel {
                role,
                cookie_name: role.cookie_name(),
                signer: TokenSigner::new(
                    settings.secret.as_bytes(),
                    Duration::from_secs(settings.expires_secs),
                ),
            }
        };
        Self {
            channels: Role::ALL.map(channel),
        }
    }

    pub fn channel(&self, role: Role) -> &RoleChannel {
        &self.channels[role.index()]
    }

    /// Sign a credential for `subject` under `role`'s secret.
    pub fn issue(&self, role: Role, subject: &str) -> Result<String, TokenError> {
        self.channel(role).signer.issue(subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing_is_case_insensitive() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("Doctor".parse::<Role>().unwrap(), Role::Doctor);
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn test_table_binds_each_role_to_its_own_cookie() {
        let table = RoleTable::from_config(&AuthConfig::default());
        for role in Role::ALL {
            let channel = table.channel(role);
            assert_eq!(channel.role, role);
            assert_eq!(channel.cookie_name, role.cookie_name());
        }
    }
}
