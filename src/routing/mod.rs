//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → router.rs (route lookup)
//!     → matcher.rs (evaluate match conditions)
//!     → Return: RoutePolicy (role, lockout, rate tier)
//!
//! Route Compilation (at startup):
//!     RouteSpec[] + configured rate overrides
//!     → Compile matchers (method + path template)
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - The same declarations build the handler router, so policy and
//!   dispatch cannot drift apart
//! - Deterministic: same input always matches same route

pub mod matcher;
pub mod router;

pub use router::{RoutePolicy, RouteSpec, RouteTable};
