//! Retry policy configuration.

use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use thiserror::Error;

/// Invalid retry policy parameters.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RetryPolicyError {
    #[error("backoff multiplier must be greater than 1.0 (got {0})")]
    Multiplier(f64),

    #[error("jitter fraction must be within 0.0..=1.0 (got {0})")]
    Jitter(f64),

    #[error("initial delay {initial:?} exceeds maximum delay {max:?}")]
    DelayOrder { initial: Duration, max: Duration },
}

/// Retry policy for remote operations.
///
/// Immutable once constructed and shared by every operation run through the same
/// executor. `max_retries` counts *retries*: an operation is invoked at most
/// `max_retries + 1` times.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
    jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(5000),
            backoff_multiplier: 2.0,
            jitter_fraction: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
        jitter_fraction: f64,
    ) -> Result<Self, RetryPolicyError> {
        // `!(x > 1.0)` also rejects NaN.
        if !(backoff_multiplier > 1.0) || !backoff_multiplier.is_finite() {
            return Err(RetryPolicyError::Multiplier(backoff_multiplier));
        }
        if !(0.0..=1.0).contains(&jitter_fraction) {
            return Err(RetryPolicyError::Jitter(jitter_fraction));
        }
        if initial_delay > max_delay {
            return Err(RetryPolicyError::DelayOrder {
                initial: initial_delay,
                max: max_delay,
            });
        }

        Ok(Self {
            max_retries,
            initial_delay,
            max_delay,
            backoff_multiplier,
            jitter_fraction,
        })
    }

    /// Create a policy with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn backoff_multiplier(&self) -> f64 {
        self.backoff_multiplier
    }

    pub fn jitter_fraction(&self) -> f64 {
        self.jitter_fraction
    }

    /// Un-jittered delay before retry number `retry` (0-indexed).
    ///
    /// `initial_delay * multiplier^retry`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let initial = self.initial_delay.as_secs_f64();
        let max = self.max_delay.as_secs_f64();
        let grown = initial * self.backoff_multiplier.powi(retry.min(i32::MAX as u32) as i32);

        if !grown.is_finite() || grown >= max {
            self.max_delay
        } else {
            Duration::from_secs_f64(grown)
        }
    }

    /// Next base delay in the sequence: `min(delay * multiplier, max_delay)`.
    pub fn next_delay(&self, delay: Duration) -> Duration {
        let grown = delay.as_secs_f64() * self.backoff_multiplier;
        if !grown.is_finite() || grown >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(grown)
        }
    }

    /// Inclusive band `[delay * (1 - jitter), delay * (1 + jitter)]`, in whole nanoseconds.
    pub fn jitter_bounds(&self, delay: Duration) -> (Duration, Duration) {
        let nanos = delay.as_nanos().min(u64::MAX as u128) as f64;
        let low = (nanos * (1.0 - self.jitter_fraction)).ceil();
        let high = (nanos * (1.0 + self.jitter_fraction)).floor();
        let low = low.clamp(0.0, u64::MAX as f64) as u64;
        let high = (high.clamp(0.0, u64::MAX as f64) as u64).max(low);
        (Duration::from_nanos(low), Duration::from_nanos(high))
    }

    /// Draw the actual wait uniformly from [`Self::jitter_bounds`].
    pub fn jittered<R: Rng + ?Sized>(&self, delay: Duration, rng: &mut R) -> Duration {
        let (low, high) = self.jitter_bounds(delay);
        if low == high {
            return low;
        }
        let nanos = rng.gen_range(low.as_nanos() as u64..=high.as_nanos() as u64);
        Duration::from_nanos(nanos)
    }

    /// Check if another retry is allowed after `retries_done` retries.
    pub fn should_retry(&self, retries_done: u32) -> bool {
        retries_done < self.max_retries
    }
}
