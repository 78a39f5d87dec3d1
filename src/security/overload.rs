//! Overload detection for load shedding.
//!
//! A background task sleeps for the sampling interval and measures how late
//! it wakes up. On a single-threaded worker that delay is the time other
//! tasks held the scheduler, so it tracks how far behind request processing
//! is. The lag is smoothed so a single slow tick does not flip the signal on
//! its own, and the busy flag is recomputed on every sample.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::OverloadConfig;
use crate::observability::metrics;

/// Weight of the newest sample in the smoothed lag.
const SMOOTHING_FACTOR: f64 = 1.0 / 3.0;

struct OverloadState {
    enabled: bool,
    interval: Duration,
    max_lag: Duration,
    busy: AtomicBool,
    smoothed_lag_us: AtomicU64,
}

/// Process-local busy signal. Cloning shares the same state.
#[derive(Clone)]
pub struct OverloadMonitor {
    state: Arc<OverloadState>,
}

impl OverloadMonitor {
    pub fn new(config: &OverloadConfig) -> Self {
        Self {
            state: Arc::new(OverloadState {
                enabled: config.enabled,
                interval: Duration::from_millis(config.sample_interval_ms),
                max_lag: Duration::from_millis(config.max_lag_ms),
                busy: AtomicBool::new(false),
                smoothed_lag_us: AtomicU64::new(0),
            }),
        }
    }

    /// Whether the worker should shed new requests.
    pub fn is_busy(&self) -> bool {
        self.state.enabled && self.state.busy.load(Ordering::Relaxed)
    }

    pub fn current_lag(&self) -> Duration {
        Duration::from_micros(self.state.smoothed_lag_us.load(Ordering::Relaxed))
    }

    /// Fold one lag sample into the smoothed lag and recompute the busy flag.
    pub fn observe(&self, lag: Duration) -> bool {
        let previous = self.state.smoothed_lag_us.load(Ordering::Relaxed) as f64;
        let sample = lag.as_micros() as f64;
        let smoothed = SMOOTHING_FACTOR * sample + (1.0 - SMOOTHING_FACTOR) * previous;
        let smoothed = Duration::from_micros(smoothed.round() as u64);

        self.state
            .smoothed_lag_us
            .store(smoothed.as_micros() as u64, Ordering::Relaxed);
        let busy = smoothed > self.state.max_lag;
        let was_busy = self.state.busy.swap(busy, Ordering::Relaxed);

        if busy != was_busy {
            if busy {
                tracing::warn!(lag_ms = smoothed.as_millis() as u64, "Worker overloaded, shedding requests");
            } else {
                tracing::info!(lag_ms = smoothed.as_millis() as u64, "Worker recovered");
            }
        }
        metrics::record_overload_lag(smoothed);
        busy
    }

    /// Start the sampler. It exits when `shutdown` fires.
    pub fn spawn(&self, mut shutdown: broadcast::Receiver<()>) -> Option<JoinHandle<()>> {
        if !self.state.enabled {
            tracing::info!("Overload shedding disabled");
            return None;
        }

        let monitor = self.clone();
        let interval = self.state.interval;
        tracing::info!(
            interval_ms = interval.as_millis() as u64,
            max_lag_ms = self.state.max_lag.as_millis() as u64,
            "Overload monitor starting"
        );

        Some(tokio::spawn(async move {
            loop {
                let started = Instant::now();
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        let lag = started.elapsed().saturating_sub(interval);
                        monitor.observe(lag);
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Overload monitor received shutdown signal");
                        break;
                    }
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> OverloadMonitor {
        OverloadMonitor::new(&OverloadConfig {
            enabled: true,
            sample_interval_ms: 250,
            max_lag_ms: 10,
        })
    }

    #[test]
    fn test_small_lag_is_not_busy() {
        let monitor = monitor();
        for _ in 0..10 {
            assert!(!monitor.observe(Duration::from_millis(5)));
        }
        assert!(!monitor.is_busy());
    }

    #[test]
    fn test_large_lag_flips_busy_then_recovers() {
        let monitor = monitor();
        assert!(monitor.observe(Duration::from_millis(90)));
        assert!(monitor.is_busy());

        // Smoothed lag decays by 2/3 per idle sample: 30 → 20 → 13.3 → 8.9
        let mut samples = 0;
        while monitor.observe(Duration::ZERO) {
            samples += 1;
            assert!(samples < 10, "monitor never recovered");
        }
        assert!(!monitor.is_busy());
        assert!(monitor.current_lag() <= Duration::from_millis(10));
    }

    #[test]
    fn test_disabled_monitor_never_busy() {
        let monitor = OverloadMonitor::new(&OverloadConfig {
            enabled: false,
            ..OverloadConfig::default()
        });
        monitor.observe(Duration::from_secs(1));
        assert!(!monitor.is_busy());
    }

    #[tokio::test]
    async fn test_sampler_stops_on_shutdown() {
        let monitor = OverloadMonitor::new(&OverloadConfig {
            enabled: true,
            sample_interval_ms: 5,
            max_lag_ms: 1_000,
        });
        let (tx, rx) = broadcast::channel(1);
        let handle = monitor.spawn(rx).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();
        assert!(!monitor.is_busy());
    }
}
