//! Storefront admission gateway library.

pub mod auth;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod pipeline;
pub mod resilience;
pub mod routing;
pub mod security;
pub mod session;
pub mod store;

pub use config::schema::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
