//! Reconnection backoff policy.
//!
//! Pure exponential backoff: `delay(attempt) = min(base * 2^(attempt-1), cap)`
//! for 1-indexed attempts, capped at 30 s by default. Deliberately
//! deterministic (no jitter): a single client retrying one logical channel
//! does not have the thundering-herd problem the jittered LLM retry path
//! guards against, and tests assert the exact sequence.

use std::time::Duration;

/// Default base delay between attempts in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default cap on the computed delay in milliseconds.
pub const DEFAULT_CAP_MS: u64 = 30_000;

/// Compute the delay before 1-indexed `attempt`.
///
/// `attempt == 0` is treated as the first attempt. The doubling shift is
/// saturated so very large attempt counts cannot overflow.
#[must_use]
pub fn delay_for_attempt(attempt: u32, base_ms: u64, cap_ms: u64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(63);
    let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
    let delay = base_ms.saturating_mul(factor).min(cap_ms);
    Duration::from_millis(delay)
}

/// Attempt counter for one reconnection cycle.
///
/// `next_delay` increments the counter and returns the wait before that
/// attempt; `reset` zeroes it on a successful connection.
#[derive(Clone, Debug)]
pub struct Backoff {
    base_ms: u64,
    cap_ms: u64,
    attempt: u32,
}

impl Backoff {
    /// Create a policy with the given base delay and cap.
    #[must_use]
    pub fn new(base_ms: u64, cap_ms: u64) -> Self {
        Self {
            base_ms,
            cap_ms,
            attempt: 0,
        }
    }

    /// Current attempt number (0 before any attempt).
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Advance to the next attempt and return the delay before it.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        delay_for_attempt(self.attempt, self.base_ms, self.cap_ms)
    }

    /// Reset the counter after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY_MS, DEFAULT_CAP_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn exact_doubling_sequence() {
        assert_eq!(delay_for_attempt(1, 1000, 30_000).as_millis(), 1000);
        assert_eq!(delay_for_attempt(2, 1000, 30_000).as_millis(), 2000);
        assert_eq!(delay_for_attempt(3, 1000, 30_000).as_millis(), 4000);
        assert_eq!(delay_for_attempt(4, 1000, 30_000).as_millis(), 8000);
        assert_eq!(delay_for_attempt(5, 1000, 30_000).as_millis(), 16_000);
    }

    #[test]
    fn caps_at_limit() {
        assert_eq!(delay_for_attempt(6, 1000, 30_000).as_millis(), 30_000);
        assert_eq!(delay_for_attempt(40, 1000, 30_000).as_millis(), 30_000);
    }

    #[test]
    fn zero_attempt_behaves_as_first() {
        assert_eq!(delay_for_attempt(0, 500, 30_000).as_millis(), 500);
    }

    #[test]
    fn huge_attempt_does_not_overflow() {
        let d = delay_for_attempt(u32::MAX, 1000, 30_000);
        assert_eq!(d.as_millis(), 30_000);
    }

    #[test]
    fn counter_advances_and_resets() {
        let mut backoff = Backoff::new(100, 1000);
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay().as_millis(), 100);
        assert_eq!(backoff.next_delay().as_millis(), 200);
        assert_eq!(backoff.attempt(), 2);
        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay().as_millis(), 100);
    }

    proptest! {
        #[test]
        fn matches_formula(attempt in 1u32..64, base in 1u64..10_000, cap in 1u64..120_000) {
            let expected = base
                .checked_mul(1u64 << (attempt - 1).min(63))
                .unwrap_or(u64::MAX)
                .min(cap);
            prop_assert_eq!(
                delay_for_attempt(attempt, base, cap).as_millis() as u64,
                expected
            );
        }

        #[test]
        fn sequence_non_decreasing_and_bounded(base in 1u64..10_000, cap in 1u64..120_000) {
            let mut prev = Duration::ZERO;
            for attempt in 1u32..40 {
                let d = delay_for_attempt(attempt, base, cap);
                prop_assert!(d >= prev);
                prop_assert!(d.as_millis() as u64 <= cap);
                prev = d;
            }
        }
    }
}
