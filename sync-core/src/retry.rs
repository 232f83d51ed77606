//! Caller-level retry policy.
//!
//! Tasks never retry on their own. Callers that want retries wrap task
//! submission in a loop driven by this policy, after checking that the
//! failure is one that can be retried safely.
//!
//! Formula: min(max_delay, base_delay * 2^attempt) + random(0..=jitter)

use std::time::Duration;

/// Exponential backoff with a cap and random jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: Duration,
}

impl RetryPolicy {
    /// Create a policy.
    ///
    /// `max_attempts` counts the first try, so `1` disables retries.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            jitter: Duration::ZERO,
        }
    }

    /// Add up to `jitter` of random delay to every backoff.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Maximum number of attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Check if another attempt is allowed after `attempts_made` attempts.
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Delay to wait before retry number `attempt` (0-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.min(20);
        let base_ms = self.base_delay.as_millis().min(u64::MAX as u128) as u64;
        let calculated = base_ms.saturating_mul(1u64 << shift);
        let max_ms = self.max_delay.as_millis().min(u64::MAX as u128) as u64;
        let bounded = Duration::from_millis(calculated.min(max_ms));

        bounded + Duration::from_millis(random_jitter_ms(self.jitter))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500), Duration::from_secs(30))
            .with_jitter(Duration::from_millis(250))
    }
}

/// Random jitter between 0 and `max` inclusive, in milliseconds.
fn random_jitter_ms(max: Duration) -> u64 {
    let max_ms = max.as_millis().min(u64::MAX as u128) as u64;
    if max_ms == 0 {
        return 0;
    }
    let mut bytes = [0u8; 8];
    if getrandom::getrandom(&mut bytes).is_err() {
        return 0;
    }
    u64::from_le_bytes(bytes) % (max_ms + 1)
}
