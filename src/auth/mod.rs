//! Identity verification subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     AuthConfig (per-role secret + expiry)
//!     → role.rs (RoleTable: role → cookie name, signer)
//!
//! Gated request:
//!     role cookie → token.rs (signature + expiry)
//!     → identity.rs (resolve subject)
//!     → verifier.rs (compare stored role with the route's role)
//!     → Identity attached to the request
//!
//! Account handlers:
//!     password → password.rs (Argon2id PHC hash, on the blocking pool)
//!     → identity.rs (register / find by email)
//! ```
//!
//! # Design Decisions
//! - Role is a closed enum; every role has its own secret, cookie, expiry
//! - One table lookup instead of per-role branches
//! - A credential signed for one role never verifies on another role's channel

pub mod identity;
pub mod password;
pub mod role;
pub mod token;
pub mod verifier;

pub use identity::{Identity, IdentityRecord, IdentityStore, RegisterError, StoredIdentities};
pub use password::{PasswordError, PasswordPolicy};
pub use role::{Role, RoleChannel, RoleTable};
pub use token::{Claims, TokenError, TokenSigner};
pub use verifier::{AuthError, RoleVerifier};
