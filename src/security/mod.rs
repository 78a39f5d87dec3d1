//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → overload.rs (shed when the worker is lagging)
//!     → limits.rs (cap body size)
//!     → sanitize.rs (strip operator keys and script markup)
//!     → pollution.rs (collapse duplicate query keys)
//!     → rate_limit.rs (route override, then default budget)
//!     → lockout.rs (credential submission routes only)
//!     → Pass to session and credential stages
//!
//! Outgoing response:
//!     → headers.rs (security headers)
//! ```
//!
//! # Design Decisions
//! - Fail closed: a store error rejects the request
//! - Counters live in the shared store, never in worker memory
//! - No trust in client input

pub mod headers;
pub mod limits;
pub mod lockout;
pub mod overload;
pub mod pollution;
pub mod rate_limit;
pub mod sanitize;

pub use lockout::LockoutTracker;
pub use overload::OverloadMonitor;
pub use rate_limit::{RateDecision, RateLimiter, RateTier};
