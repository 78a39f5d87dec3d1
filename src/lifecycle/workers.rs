//! Worker process supervision.
//!
//! # Responsibilities
//! - Start one worker process per slot by re-executing the current binary
//!   with `--worker-id <n>`
//! - Respawn a worker that exits, after a jittered backoff
//! - On shutdown, close every worker's stdin pipe, wait out the grace
//!   period, then kill stragglers
//!
//! # Design Decisions
//! - The primary never serves traffic and holds no request state
//! - Workers watch their stdin; EOF means the primary is gone or stopping

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};
use tokio::task::JoinSet;

use crate::config::WorkerConfig;
use crate::resilience::backoff::RespawnBackoff;

use super::Shutdown;

/// Error type for worker supervision.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("cannot locate current executable: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("worker count must be at least 1")]
    NoWorkers,
    #[error("failed to spawn worker {id}: {source}")]
    Spawn {
        id: usize,
        #[source]
        source: std::io::Error,
    },
}

/// Supervises a fixed set of worker processes.
pub struct Supervisor {
    config: WorkerConfig,
    count: usize,
    program: PathBuf,
    args: Vec<OsString>,
    shutdown: Shutdown,
}

impl Supervisor {
    /// Supervise `count` copies of the running binary, forwarding `args`.
    pub fn new(
        config: &WorkerConfig,
        count: usize,
        args: Vec<OsString>,
        shutdown: Shutdown,
    ) -> Result<Self, WorkerError> {
        let program = std::env::current_exe().map_err(WorkerError::CurrentExe)?;
        Self::with_program(config, count, program, args, shutdown)
    }

    /// Supervise an arbitrary program; `--worker-id <n>` is appended to `args`.
    pub fn with_program(
        config: &WorkerConfig,
        count: usize,
        program: impl Into<PathBuf>,
        args: Vec<OsString>,
        shutdown: Shutdown,
    ) -> Result<Self, WorkerError> {
        if count == 0 {
            return Err(WorkerError::NoWorkers);
        }
        Ok(Self {
            config: config.clone(),
            count,
            program: program.into(),
            args,
            shutdown,
        })
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Run until shutdown, then wait for every worker to exit.
    pub async fn run(self) -> Result<(), WorkerError> {
        tracing::info!(
            workers = self.count,
            program = %self.program.display(),
            "Primary starting workers"
        );

        let mut slots = JoinSet::new();
        for id in 0..self.count {
            let slot = Slot {
                id,
                config: self.config.clone(),
                program: self.program.clone(),
                args: self.args.clone(),
                shutdown: self.shutdown.clone(),
            };
            slots.spawn(slot.supervise());
        }

        while let Some(result) = slots.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Worker slot task failed");
            }
        }
        tracing::info!("All workers stopped");
        Ok(())
    }
}

struct Slot {
    id: usize,
    config: WorkerConfig,
    program: PathBuf,
    args: Vec<OsString>,
    shutdown: Shutdown,
}

impl Slot {
    fn spawn(&self) -> Result<Child, WorkerError> {
        Command::new(&self.program)
            .args(&self.args)
            .arg("--worker-id")
            .arg(self.id.to_string())
            .stdin(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| WorkerError::Spawn {
                id: self.id,
                source,
            })
    }

    async fn supervise(self) {
        let mut backoff = RespawnBackoff::new(&self.config);
        let grace = Duration::from_secs(self.config.shutdown_grace_secs);

        while !self.shutdown.is_triggered() {
            let started = Instant::now();
            match self.spawn() {
                Ok(mut child) => {
                    let pid = child.id();
                    tracing::info!(worker_id = self.id, pid, "Worker started");
                    let pipe = child.stdin.take();

                    tokio::select! {
                        status = child.wait() => match status {
                            Ok(status) => tracing::warn!(
                                worker_id = self.id,
                                pid,
                                %status,
                                "Worker exited"
                            ),
                            Err(e) => tracing::error!(
                                worker_id = self.id,
                                error = %e,
                                "Failed to wait for worker"
                            ),
                        },
                        _ = self.shutdown.wait() => {
                            drop(pipe);
                            self.stop(child, grace).await;
                            return;
                        }
                    }
                }
                Err(e) => tracing::error!(error = %e, "Worker spawn failed"),
            }

            if self.shutdown.is_triggered() {
                break;
            }
            let delay = backoff.next_delay(started.elapsed());
            tracing::info!(
                worker_id = self.id,
                attempt = backoff.attempt(),
                delay_ms = delay.as_millis() as u64,
                "Respawning worker"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.wait() => break,
            }
        }
    }

    async fn stop(&self, mut child: Child, grace: Duration) {
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(worker_id = self.id, %status, "Worker stopped");
            }
            Ok(Err(e)) => {
                tracing::error!(worker_id = self.id, error = %e, "Failed to wait for worker");
            }
            Err(_) => {
                tracing::warn!(
                    worker_id = self.id,
                    grace_secs = grace.as_secs(),
                    "Worker did not stop in time, killing"
                );
                if let Err(e) = child.start_kill() {
                    tracing::error!(worker_id = self.id, error = %e, "Failed to kill worker");
                }
                let _ = child.wait().await;
            }
        }
    }
}
