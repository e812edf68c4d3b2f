//! # Exponential Backoff
//!
//! Retry delays for failed reconciles. The delay starts at a base value and
//! doubles on every consecutive failure until it reaches the cap.
//! Sequence with the defaults (5s base, 300s cap): 5s, 10s, 20s, 40s, 80s, 160s, 300s.

use std::time::Duration;

/// Exponential backoff calculator
///
/// Tracks the delay for one resource. The watcher keeps one per identity and
/// drops it after a successful pass.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    current: Duration,
    max: Duration,
}

impl ExponentialBackoff {
    /// Create a backoff that starts at `base` and never exceeds `max`
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            current: base.min(max),
            max,
        }
    }

    /// Get the next delay and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_sequence() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(5), Duration::from_secs(300));

        let delays: Vec<u64> = (0..8).map(|_| backoff.next_backoff().as_secs()).collect();
        assert_eq!(delays, vec![5, 10, 20, 40, 80, 160, 300, 300]);
    }

    #[test]
    fn test_base_above_max_is_capped() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(600), Duration::from_secs(60));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(60));
    }
}
