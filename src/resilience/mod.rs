//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Store / identity call on the request path:
//!     → timeouts.rs (bounded deadline, timeout = fail closed)
//!
//! Worker process exits unexpectedly:
//!     → backoff.rs (jittered delay before the supervisor respawns it)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every shared-state call has a deadline
//! - A timed-out call is a denial, never a bypass
//! - Jittered backoff keeps crash-looping workers from hammering the store

pub mod backoff;
pub mod timeouts;

pub use timeouts::with_deadline;
