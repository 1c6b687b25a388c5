//! Per-target retry policy with exponential backoff and an event-age bound.
//!
//! Every rule target carries its own [`RetryPolicy`]. A dispatch is abandoned
//! when **either** bound is exceeded, whichever comes first:
//!
//! - `max_attempts`: total handler invocations (initial attempt included)
//! - `max_event_age`: time since the envelope was first dispatched
//!
//! Abandonment is reported as a dead-lettered dispatch, never thrown.
//!
//! # Example
//!
//! ```rust
//! use orderbus_runtime::retry::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::builder()
//!     .max_attempts(2)
//!     .max_event_age(Duration::from_secs(2 * 60 * 60))
//!     .initial_delay(Duration::from_millis(100))
//!     .build();
//!
//! assert!(policy.should_retry(1));
//! assert!(!policy.should_retry(2));
//! ```

use std::time::Duration;

/// Retry policy configuration for one target.
///
/// # Default Values
///
/// - `max_attempts`: 3
/// - `max_event_age`: 2 hours
/// - `initial_delay`: 100ms
/// - `max_delay`: 30 seconds
/// - `multiplier`: 2.0 (delay doubles each retry)
/// - `jitter`: enabled
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    max_event_age: Duration,
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_attempts: None,
            max_event_age: None,
            initial_delay: None,
            max_delay: None,
            multiplier: None,
            jitter: None,
        }
    }

    /// Total attempts allowed, including the first one.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Maximum age of an envelope before its dispatch is abandoned.
    #[must_use]
    pub const fn max_event_age(&self) -> Duration {
        self.max_event_age
    }

    /// Whether another attempt is allowed after `attempts_made` attempts.
    #[must_use]
    pub const fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Whether an envelope of the given age must be abandoned.
    #[must_use]
    pub fn is_expired(&self, age: Duration) -> bool {
        age > self.max_event_age
    }

    /// Calculate the delay before retry number `retry` (0-indexed).
    ///
    /// Uses exponential backoff: `initial_delay * multiplier^retry`, capped at
    /// `max_delay`. With jitter enabled the result is scaled by a random factor
    /// in `[0.5, 1.0]`.
    #[must_use]
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let base_secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped_secs = base_secs.min(self.max_delay.as_secs_f64()).max(0.0);

        let final_secs = if self.jitter {
            use rand::Rng;
            capped_secs * rand::thread_rng().gen_range(0.5..=1.0)
        } else {
            capped_secs
        };

        Duration::from_secs_f64(final_secs)
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_attempts: Option<u32>,
    max_event_age: Option<Duration>,
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
    jitter: Option<bool>,
}

impl RetryPolicyBuilder {
    /// Set total attempts (values below 1 are raised to 1).
    #[must_use]
    pub const fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Set the maximum event age.
    #[must_use]
    pub const fn max_event_age(mut self, age: Duration) -> Self {
        self.max_event_age = Some(age);
        self
    }

    /// Set initial delay before first retry.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Set maximum delay (cap for exponential backoff).
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set multiplier for exponential backoff.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Enable or disable jitter.
    #[must_use]
    pub const fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(3).max(1),
            max_event_age: self
                .max_event_age
                .unwrap_or(Duration::from_secs(2 * 60 * 60)),
            initial_delay: self.initial_delay.unwrap_or(Duration::from_millis(100)),
            max_delay: self.max_delay.unwrap_or(Duration::from_secs(30)),
            multiplier: self.multiplier.unwrap_or(2.0),
            jitter: self.jitter.unwrap_or(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_delay_calculation() {
        let policy = RetryPolicy::builder()
            .initial_delay(Duration::from_millis(100))
            .multiplier(2.0)
            .max_delay(Duration::from_secs(10))
            .jitter(false)
            .build();

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(800));
    }

    #[test]
    fn test_retry_policy_max_delay_cap() {
        let policy = RetryPolicy::builder()
            .initial_delay(Duration::from_millis(1000))
            .multiplier(10.0)
            .max_delay(Duration::from_secs(2))
            .jitter(false)
            .build();

        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(2));
    }

    #[test]
    fn test_jitter_stays_within_half_to_full_delay() {
        let policy = RetryPolicy::builder()
            .initial_delay(Duration::from_millis(400))
            .build();

        for _ in 0..50 {
            let delay = policy.delay_for_attempt(0);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(400));
        }
    }

    #[test]
    fn test_attempt_bound() {
        let policy = RetryPolicy::builder().max_attempts(2).build();
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
    }

    #[test]
    fn test_zero_attempts_is_raised_to_one() {
        let policy = RetryPolicy::builder().max_attempts(0).build();
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn test_event_age_bound() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_event_age(), Duration::from_secs(7200));
        assert!(!policy.is_expired(Duration::from_secs(7200)));
        assert!(policy.is_expired(Duration::from_secs(7201)));
    }

    proptest::proptest! {
        #[test]
        fn delay_never_exceeds_cap(
            initial_ms in 0u64..5_000,
            max_ms in 0u64..60_000,
            multiplier in -4.0f64..16.0,
            retry in 0u32..64,
            jitter in proptest::bool::ANY,
        ) {
            let policy = RetryPolicy::builder()
                .initial_delay(Duration::from_millis(initial_ms))
                .max_delay(Duration::from_millis(max_ms))
                .multiplier(multiplier)
                .jitter(jitter)
                .build();

            // f64 seconds round-trip to within a nanosecond
            let cap = Duration::from_millis(max_ms) + Duration::from_nanos(1);
            proptest::prop_assert!(policy.delay_for_attempt(retry) <= cap);
        }
    }
}
