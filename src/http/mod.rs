//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (shared port)
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request ID)
//!     → [admission pipeline decides] (crate::pipeline)
//!     → handlers/ (accounts, captcha, hello)
//!     → response.rs (JSON envelope)
//!     → Send to client
//! ```

pub mod cookies;
pub mod handlers;
pub mod request;
pub mod response;
pub mod routes;
pub mod server;

pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::{AppState, HttpServer, ServerError};
