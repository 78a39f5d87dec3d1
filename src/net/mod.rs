//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Worker start
//!     → listener.rs (bind the shared port with SO_REUSEPORT)
//!     → Hand off to HTTP layer
//!
//! Incoming TCP connection
//!     → kernel picks one of the workers bound to the port
//! ```
//!
//! # Design Decisions
//! - No file descriptor passing between processes
//! - TLS is terminated in front of the gateway

pub mod listener;

pub use listener::{bind_shared, ListenerError};
