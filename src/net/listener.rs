//! Shared-port TCP listener.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Let every worker process bind the same port (`SO_REUSEPORT`), so the
//!   kernel spreads incoming connections across workers
//!
//! # Design Decisions
//! - Each worker owns its socket; nothing is passed between processes
//! - Bind failures are fatal for the worker (the supervisor respawns it)

use std::io;
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpSocket};

use crate::config::ListenerConfig;

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("invalid bind address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Bind the configured address, sharing the port when `reuse_port` is set.
pub fn bind_shared(config: &ListenerConfig) -> Result<TcpListener, ListenerError> {
    let addr: SocketAddr =
        config
            .bind_address
            .parse()
            .map_err(|e: std::net::AddrParseError| ListenerError::InvalidAddress {
                address: config.bind_address.clone(),
                reason: e.to_string(),
            })?;

    let bind = |addr: SocketAddr| -> io::Result<TcpListener> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        #[cfg(unix)]
        socket.set_reuseport(config.reuse_port)?;
        socket.bind(addr)?;
        socket.listen(config.backlog)
    };

    let listener = bind(addr).map_err(|source| ListenerError::Bind { addr, source })?;
    tracing::info!(
        address = %addr,
        reuse_port = config.reuse_port,
        backlog = config.backlog,
        "Listener bound"
    );
    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_address() {
        let config = ListenerConfig {
            bind_address: "not-an-address".to_string(),
            ..ListenerConfig::default()
        };
        assert!(matches!(
            bind_shared(&config),
            Err(ListenerError::InvalidAddress { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_two_listeners_share_a_port() {
        let config = ListenerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            ..ListenerConfig::default()
        };
        let first = bind_shared(&config).unwrap();
        let port = first.local_addr().unwrap().port();

        let shared = ListenerConfig {
            bind_address: format!("127.0.0.1:{port}"),
            ..config
        };
        let second = bind_shared(&shared).unwrap();
        assert_eq!(second.local_addr().unwrap().port(), port);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_port_not_shared_without_reuse() {
        let config = ListenerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            reuse_port: false,
            ..ListenerConfig::default()
        };
        let first = bind_shared(&config).unwrap();
        let port = first.local_addr().unwrap().port();
        let again = ListenerConfig {
            bind_address: format!("127.0.0.1:{port}"),
            ..config
        };
        assert!(matches!(bind_shared(&again), Err(ListenerError::Bind { .. })));
    }
}
