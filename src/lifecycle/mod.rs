//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Primary (workers.rs):
//!     Spawn N workers → wait → respawn with backoff → on shutdown,
//!     close pipes → grace period → kill
//!
//! Worker (signals.rs):
//!     SIGTERM/SIGINT or stdin EOF → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     Broadcast → server drains, sampler and sweeper stop
//! ```
//!
//! # Design Decisions
//! - Workers never outlive the primary (stdin pipe, kill_on_drop)
//! - Shutdown has a deadline: stragglers are killed after the grace period

pub mod shutdown;
pub mod signals;
pub mod workers;

pub use shutdown::Shutdown;
pub use workers::{Supervisor, WorkerError};
