//! Storefront admission gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────┐
//!                    │ primary: spawns N workers, respawns on exit          │
//!                    └───────────────┬──────────────────────────────────────┘
//!                                    │ re-exec with --worker-id
//!             ┌──────────────────────┼──────────────────────┐
//!             ▼                      ▼                      ▼
//!     ┌──────────────┐       ┌──────────────┐       ┌──────────────┐
//!     │  worker 0    │       │  worker 1    │  ...  │  worker N-1  │
//!     │  listener    │       │  listener    │       │  listener    │
//!     │  (REUSEPORT) │       │  (REUSEPORT) │       │  (REUSEPORT) │
//!     │  pipeline    │       │  pipeline    │       │  pipeline    │
//!     │  handlers    │       │  handlers    │       │  handlers    │
//!     └──────┬───────┘       └──────┬───────┘       └──────┬───────┘
//!            └──────────────────────┼──────────────────────┘
//!                                   ▼
//!                    ┌──────────────────────────────┐
//!                    │ shared store (memory/redis)  │
//!                    │ counters, lockouts, sessions │
//!                    └──────────────────────────────┘
//! ```
//!
//! Every worker runs the admission pipeline in order: overload, body limit,
//! sanitization, parameter pollution, compression, rate limit, session,
//! lockout, verification.

use std::ffi::OsString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::Instrument;

use storefront_gate::config::{load_config, GatewayConfig};
use storefront_gate::lifecycle::signals::{spawn_parent_watch, spawn_signal_handler};
use storefront_gate::lifecycle::{Shutdown, Supervisor};
use storefront_gate::net::bind_shared;
use storefront_gate::observability::{logging, metrics};
use storefront_gate::{store, HttpServer};

#[derive(Parser, Debug)]
#[command(name = "storefront-gate")]
#[command(about = "Admission and identity gateway for the storefront API", long_about = None)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of worker processes (defaults to one per CPU).
    #[arg(short, long)]
    workers: Option<usize>,

    /// Serve from this process instead of spawning workers.
    #[arg(long)]
    single: bool,

    /// Set by the primary when it starts a worker.
    #[arg(long, hide = true)]
    worker_id: Option<usize>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    logging::init(&config.observability);

    match (args.worker_id, args.single) {
        (Some(worker_id), _) => run_worker(config, worker_id, true),
        (None, true) => run_worker(config, 0, false),
        (None, false) => run_primary(&args, config),
    }
}

/// Serve traffic on the shared port until told to stop.
fn run_worker(
    config: GatewayConfig,
    worker_id: usize,
    supervised: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let span = tracing::info_span!("worker", worker_id, pid = std::process::id());
    let result = runtime.block_on(
        async move {
            tracing::info!(
                bind_address = %config.listener.bind_address,
                store = %redact(&config.store.url),
                "storefront-gate worker starting"
            );

            let shared = store::connect(&config.store.url).await?;

            if config.observability.metrics_enabled {
                match config.observability.metrics_address.parse::<SocketAddr>() {
                    Ok(base) => metrics::init_metrics(metrics::worker_address(base, worker_id)),
                    Err(e) => tracing::error!(
                        metrics_address = %config.observability.metrics_address,
                        error = %e,
                        "Failed to parse metrics address"
                    ),
                }
            }

            let listener = bind_shared(&config.listener)?;
            let shutdown = Shutdown::new();
            spawn_signal_handler(shutdown.clone());
            if supervised {
                spawn_parent_watch(shutdown.clone());
            }

            HttpServer::new(config, shared, worker_id)?
                .run(listener, &shutdown)
                .await?;
            tracing::info!("Shutdown complete");
            Ok::<(), Box<dyn std::error::Error>>(())
        }
        .instrument(span),
    );

    // A blocked stdin read must not hold the process open.
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

/// Spawn and supervise the worker processes.
fn run_primary(args: &Args, config: GatewayConfig) -> Result<(), Box<dyn std::error::Error>> {
    let count = args
        .workers
        .unwrap_or_else(|| config.workers.effective_count());

    let mut forwarded: Vec<OsString> = Vec::new();
    if let Some(path) = &args.config {
        forwarded.push("--config".into());
        forwarded.push(path.clone().into_os_string());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        tracing::info!(
            pid = std::process::id(),
            workers = count,
            bind_address = %config.listener.bind_address,
            "storefront-gate primary starting"
        );

        let shutdown = Shutdown::new();
        spawn_signal_handler(shutdown.clone());

        Supervisor::new(&config.workers, count, forwarded, shutdown)?
            .run()
            .await?;
        tracing::info!("Primary stopped");
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Hide credentials embedded in a store URL.
fn redact(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        }
        _ => url.to_string(),
    }
}
