use crate::client::providers::SourceError;
use crate::error::ErrorCategory;
use crate::Error;
use std::fmt::Display;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry configuration for a single outbound request
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, first one included
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Maximum jitter as percentage of delay
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Config with no waiting between attempts
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }

    /// Backoff delay before retry number `attempt` (0-based)
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss,
        clippy::cast_possible_wrap
    )]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_delay_ms = self.initial_delay.as_millis() as f64;
        let exponential_delay_ms = base_delay_ms * self.multiplier.powi(attempt as i32);
        let capped_delay_ms = exponential_delay_ms.min(self.max_delay.as_millis() as f64);
        let delay = Duration::from_millis(capped_delay_ms as u64);

        add_jitter(delay, self.jitter)
    }
}

/// Errors that know whether repeating the same request can help
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for SourceError {
    fn is_retryable(&self) -> bool {
        self.is_retryable()
    }
}

impl Retryable for Error {
    fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }
}

/// Attempt counter for one request.
///
/// The caller drives the loop so that it can react to each failure (swap a
/// proxy, rebuild a client) before the next attempt.
#[derive(Debug)]
pub struct Backoff {
    config: RetryConfig,
    attempt: u32,
}

impl Backoff {
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self { config, attempt: 1 }
    }

    /// Current attempt number, starting at 1
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next attempt, or `None` when `error` ends the request
    pub fn next_delay<E>(&mut self, error: &E, operation_name: &str) -> Option<Duration>
    where
        E: Retryable + Display,
    {
        if !error.is_retryable() {
            debug!(
                "Operation '{}' failed with non-retryable error: {}",
                operation_name, error
            );
            return None;
        }

        if self.attempt >= self.config.max_attempts {
            warn!(
                "Operation '{}' failed after {} attempts: {}",
                operation_name, self.attempt, error
            );
            return None;
        }

        let delay = self.config.delay_for(self.attempt - 1);
        debug!(
            "Operation '{}' failed (attempt {}), retrying after {:?}: {}",
            operation_name, self.attempt, delay, error
        );
        self.attempt += 1;
        Some(delay)
    }
}

/// Add jitter to delay
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn add_jitter(delay: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return delay;
    }

    use rand::Rng;
    let mut rng = rand::thread_rng();
    let jitter_ms = (delay.as_millis() as f64 * jitter_factor) as u64;
    let jitter = rng.gen_range(0..=jitter_ms);

    delay + Duration::from_millis(jitter)
}
