//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGINT (ctrl-c) or SIGTERM
//! - Translate either into the process-wide shutdown signal
//! - In workers, treat EOF on stdin (the supervisor dropping its end) the
//!   same way, so workers never outlive their primary

use tokio::io::AsyncReadExt;

use super::Shutdown;

/// Resolve when the process is asked to terminate.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!(signal = "SIGINT", "Shutdown signal received"),
        _ = terminate => tracing::info!(signal = "SIGTERM", "Shutdown signal received"),
    }
}

/// Trigger `shutdown` on the first termination signal.
pub fn spawn_signal_handler(shutdown: Shutdown) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown_signal() => shutdown.trigger(),
            _ = shutdown.wait() => {}
        }
    })
}

/// Trigger `shutdown` once stdin reaches EOF.
///
/// Workers are started with a piped stdin held by the supervisor; the pipe
/// closes when the supervisor stops it or dies.
pub fn spawn_parent_watch(shutdown: Shutdown) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut stdin = tokio::io::stdin();
        let mut buf = [0u8; 64];
        loop {
            tokio::select! {
                read = stdin.read(&mut buf) => match read {
                    Ok(0) | Err(_) => {
                        tracing::info!("Supervisor pipe closed");
                        shutdown.trigger();
                        break;
                    }
                    Ok(_) => continue,
                },
                _ = shutdown.wait() => break,
            }
        }
    })
}
