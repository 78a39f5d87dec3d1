//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (overlay environment: secrets, store URL, thresholds)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; workers pick up changes on respawn
//! - All fields have defaults to allow minimal configs
//! - Secrets have no defaults: validation fails until they are injected

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{apply_env, load_config, ConfigError};
pub use schema::*;
