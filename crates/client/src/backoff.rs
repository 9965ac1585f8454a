//! Jittered exponential backoff for reconnect scheduling.

use std::time::Duration;

use rand::Rng;

const DEFAULT_BASE_DELAY_MS: u64 = 500;
const DEFAULT_MAX_DELAY_MS: u64 = 15_000;
const DEFAULT_JITTER_FACTOR: f64 = 0.2;

/// Reconnect backoff schedule.
///
/// The pre-jitter delay doubles per attempt up to the cap; uniform jitter of
/// up to `jitter_factor` of the capped delay is added on top so a fleet of
/// clients does not reconnect in lockstep after a server restart.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Base delay for the first retry (milliseconds).
    pub base_delay_ms: u64,
    /// Cap on the pre-jitter delay (milliseconds).
    pub max_delay_ms: u64,
    /// Jitter factor (0.0 - 1.0), applied to the capped delay.
    pub jitter_factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl BackoffPolicy {
    /// Policy with custom base and cap, default jitter.
    pub fn new(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }

    /// Set the jitter factor.
    pub fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor;
        self
    }

    /// Pre-jitter delay for `attempt` (0-indexed): `min(base · 2^attempt, max)`.
    pub fn raw_delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay_ms
            .saturating_mul(2_u64.saturating_pow(attempt));
        Duration::from_millis(exponential.min(self.max_delay_ms))
    }

    /// Delay before retry `attempt`, with jitter applied.
    pub fn delay(&self, attempt: u32) -> Duration {
        let capped = self.raw_delay(attempt);

        let jitter_range = capped.as_millis() as f64 * self.jitter_factor;
        let jitter_ms = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(0.0..jitter_range).floor() as u64
        } else {
            0
        };

        capped.saturating_add(Duration::from_millis(jitter_ms))
    }
}
