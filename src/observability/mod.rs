//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, tagged with worker_id)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape, one per worker)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every span via `x-request-id`
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
