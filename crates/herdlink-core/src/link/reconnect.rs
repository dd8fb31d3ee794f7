use std::time::Duration;

use tokio::time::Instant;

use crate::config::ReconnectConfig;
use crate::model::PeripheralAddress;

/// An automatic reconnect waiting for its backoff to elapse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReconnect {
    pub address: PeripheralAddress,
    pub name: Option<String>,
    /// Attempt number this reconnect will run as (1-based).
    pub attempt: u32,
    pub due: Instant,
}

impl PendingReconnect {
    /// Schedule the reconnect that follows `failed_attempts` consecutive
    /// failures, or `None` once `max_retries` is exhausted.
    pub fn schedule(
        address: PeripheralAddress,
        name: Option<String>,
        failed_attempts: u32,
        config: &ReconnectConfig,
    ) -> Option<Self> {
        let attempt = failed_attempts.saturating_add(1);
        if config.max_retries.is_some_and(|max| attempt > max) {
            return None;
        }
        Some(Self {
            address,
            name,
            attempt,
            due: Instant::now() + calculate_backoff(failed_attempts, config),
        })
    }
}

/// Calculate backoff delay with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`
///
/// Jitter is +-25% so a herd of tags dropping together does not reconnect
/// in lockstep.
pub fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic "jitter" seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}
