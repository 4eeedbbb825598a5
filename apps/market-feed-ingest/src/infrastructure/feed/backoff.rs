//! Invalid-Token Backoff
//!
//! Exponential backoff applied when the authorize endpoint reports an invalid
//! or expired token. Delays double from the initial value up to a cap and are
//! deterministic; the sequence restarts after the next successful
//! authorization.

use std::time::Duration;

/// Configuration for token backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// First delay.
    pub initial_delay: Duration,
    /// Largest delay.
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(100),
        }
    }
}

/// Doubling backoff with a cap.
///
/// # Example
///
/// ```rust
/// use market_feed_ingest::infrastructure::feed::{BackoffConfig, TokenBackoff};
/// use std::time::Duration;
///
/// let mut backoff = TokenBackoff::new(BackoffConfig::default());
/// assert_eq!(backoff.next_delay(), Duration::from_secs(1));
/// assert_eq!(backoff.next_delay(), Duration::from_secs(2));
///
/// backoff.reset();
/// assert_eq!(backoff.next_delay(), Duration::from_secs(1));
/// ```
#[derive(Debug)]
pub struct TokenBackoff {
    config: BackoffConfig,
    current_delay: Duration,
    attempt_count: u32,
}

impl TokenBackoff {
    /// Create a new backoff at its initial delay.
    #[must_use]
    pub const fn new(config: BackoffConfig) -> Self {
        Self {
            current_delay: config.initial_delay,
            config,
            attempt_count: 0,
        }
    }

    /// Return the delay to wait now and advance the sequence.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt_count = self.attempt_count.saturating_add(1);
        let delay = self.current_delay.min(self.config.max_delay);
        self.current_delay = self
            .current_delay
            .saturating_mul(2)
            .min(self.config.max_delay);
        delay
    }

    /// Restart the sequence after a successful authorization.
    pub const fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.attempt_count = 0;
    }

    /// Delays handed out since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn doubles_then_caps_at_one_hundred_seconds() {
        let mut backoff = TokenBackoff::new(BackoffConfig::default());
        let delays: Vec<u64> = (0..11).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 64, 100, 100, 100, 100]);
        assert_eq!(backoff.attempt_count(), 11);
    }

    #[test]
    fn reset_restarts_at_initial_delay() {
        let mut backoff = TokenBackoff::new(BackoffConfig::default());
        for _ in 0..5 {
            let _ = backoff.next_delay();
        }

        backoff.reset();

        assert_eq!(backoff.attempt_count(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }

    #[test]
    fn initial_above_cap_is_capped() {
        let mut backoff = TokenBackoff::new(BackoffConfig {
            initial_delay: Duration::from_secs(500),
            max_delay: Duration::from_secs(100),
        });
        assert_eq!(backoff.next_delay(), Duration::from_secs(100));
    }

    proptest! {
        #[test]
        fn delays_never_decrease_nor_exceed_cap(
            initial_ms in 1u64..10_000,
            max_ms in 1u64..1_000_000,
            steps in 1usize..64,
        ) {
            let max_delay = Duration::from_millis(max_ms);
            let mut backoff = TokenBackoff::new(BackoffConfig {
                initial_delay: Duration::from_millis(initial_ms),
                max_delay,
            });

            let mut previous = Duration::ZERO;
            for _ in 0..steps {
                let delay = backoff.next_delay();
                prop_assert!(delay <= max_delay);
                prop_assert!(delay >= previous);
                previous = delay;
            }
        }
    }
}
