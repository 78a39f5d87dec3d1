//! Password hashing with Argon2id.
//!
//! Hashes are stored in PHC string form, so each one carries its own salt
//! and cost parameters. Verification reads the parameters from the stored
//! hash, which lets the configured cost change without invalidating
//! existing accounts.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;

use crate::config::PasswordConfig;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("invalid password hashing parameters: {0}")]
    Params(String),
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("stored password hash is malformed: {0}")]
    Malformed(String),
    #[error("password hashing task failed: {0}")]
    Task(String),
}

/// Configured Argon2id hasher. Cloning is cheap.
#[derive(Clone)]
pub struct PasswordPolicy {
    argon: Argon2<'static>,
}

impl PasswordPolicy {
    pub fn from_config(config: &PasswordConfig) -> Result<Self, PasswordError> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| PasswordError::Params(e.to_string()))?;
        Ok(Self {
            argon: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// PHC string for `password` under a fresh random salt.
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| PasswordError::Hash(e.to_string()))
    }

    /// Whether `password` matches the stored PHC string.
    pub fn verify(&self, password: &str, stored: &str) -> Result<bool, PasswordError> {
        let parsed = PasswordHash::new(stored).map_err(|e| PasswordError::Malformed(e.to_string()))?;
        match self.argon.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(PasswordError::Malformed(e.to_string())),
        }
    }

    /// [`Self::hash`] on the blocking pool, off the request workers.
    pub async fn hash_blocking(&self, password: String) -> Result<String, PasswordError> {
        let policy = self.clone();
        tokio::task::spawn_blocking(move || policy.hash(&password))
            .await
            .map_err(|e| PasswordError::Task(e.to_string()))?
    }

    /// [`Self::verify`] on the blocking pool.
    pub async fn verify_blocking(&self, password: String, stored: String) -> Result<bool, PasswordError> {
        let policy = self.clone();
        tokio::task::spawn_blocking(move || policy.verify(&password, &stored))
            .await
            .map_err(|e| PasswordError::Task(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> PasswordPolicy {
        PasswordPolicy::from_config(&PasswordConfig {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap()
    }

    #[test]
    fn test_hash_is_argon2id_and_salted() {
        let policy = cheap();
        let a = policy.hash("hunter2").unwrap();
        let b = policy.hash("hunter2").unwrap();
        assert!(a.starts_with("$argon2id$v=19$m=64,t=1,p=1$"));
        assert_ne!(a, b);
        assert!(!a.contains("hunter2"));
    }

    #[test]
    fn test_verify() {
        let policy = cheap();
        let stored = policy.hash("hunter2").unwrap();
        assert!(policy.verify("hunter2", &stored).unwrap());
        assert!(!policy.verify("hunter3", &stored).unwrap());
        assert!(matches!(
            policy.verify("hunter2", "not-a-phc-string"),
            Err(PasswordError::Malformed(_))
        ));
    }

    #[test]
    fn test_verify_uses_stored_parameters() {
        let stored = cheap().hash("pw").unwrap();
        let stronger = PasswordPolicy::from_config(&PasswordConfig {
            memory_kib: 128,
            iterations: 2,
            parallelism: 1,
        })
        .unwrap();
        assert!(stronger.verify("pw", &stored).unwrap());
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let err = PasswordPolicy::from_config(&PasswordConfig {
            memory_kib: 1,
            iterations: 1,
            parallelism: 1,
        });
        assert!(matches!(err, Err(PasswordError::Params(_))));
    }

    #[tokio::test]
    async fn test_blocking_variants() {
        let policy = cheap();
        let stored = policy.hash_blocking("pw".to_string()).await.unwrap();
        assert!(policy.verify_blocking("pw".to_string(), stored).await.unwrap());
    }
}
