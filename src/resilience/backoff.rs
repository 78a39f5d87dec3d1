//! Exponential backoff with jitter for worker respawns.

use std::time::Duration;

use rand::Rng;

use crate::config::WorkerConfig;

/// Calculate exponential backoff delay with jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let capped_delay = base_ms.saturating_mul(exponential_base).min(max_ms);

    // Jitter of up to 10% keeps crashed workers from restarting in lockstep.
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// Respawn delay for one worker slot.
///
/// Consecutive quick exits back off exponentially; a worker that stayed up
/// for `stable_after` resets the sequence.
#[derive(Debug, Clone)]
pub struct RespawnBackoff {
    base_ms: u64,
    max_ms: u64,
    stable_after: Duration,
    attempt: u32,
}

impl RespawnBackoff {
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            base_ms: config.respawn_base_delay_ms,
            max_ms: config.respawn_max_delay_ms,
            stable_after: Duration::from_secs(config.stable_after_secs),
            attempt: 0,
        }
    }

    /// Delay before the next start, given how long the last run lasted.
    pub fn next_delay(&mut self, ran_for: Duration) -> Duration {
        if ran_for >= self.stable_after {
            self.attempt = 0;
        }
        self.attempt = self.attempt.saturating_add(1);
        calculate_backoff(self.attempt, self.base_ms, self.max_ms)
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
