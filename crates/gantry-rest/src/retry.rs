use std::time::Duration;

/// Immutable backoff policy consulted by the client between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: usize,
    base_backoff: Duration,
    exponential: bool,
    max_backoff: Duration,
}

impl RetryPolicy {
    /// Constant backoff: every wait is `base_backoff`.
    pub fn constant(max_retries: usize, base_backoff: Duration) -> Self {
        Self {
            max_retries,
            base_backoff,
            exponential: false,
            max_backoff: base_backoff,
        }
    }

    /// Exponential backoff doubling per attempt, capped at `max_backoff`.
    pub fn exponential(max_retries: usize, base_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_retries,
            base_backoff,
            exponential: true,
            max_backoff,
        }
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Wait before retry `attempt` (0-indexed): `min(max, base * 2^attempt)`
    /// when exponential, else `base`.
    pub fn wait_time(&self, attempt: usize) -> Duration {
        if !self.exponential {
            return self.base_backoff;
        }
        let factor = match u32::try_from(attempt).ok().and_then(|k| 2u32.checked_pow(k)) {
            Some(factor) => factor,
            None => return self.max_backoff,
        };
        self.base_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_waits_double_then_cap() {
        let policy = RetryPolicy::exponential(
            6,
            Duration::from_millis(500),
            Duration::from_millis(5000),
        );
        let waits: Vec<u64> = (0..6)
            .map(|k| policy.wait_time(k).as_millis() as u64)
            .collect();
        assert_eq!(waits, [500, 1000, 2000, 4000, 5000, 5000]);
    }

    #[test]
    fn constant_waits_are_flat() {
        let policy = RetryPolicy::constant(3, Duration::from_millis(250));
        assert_eq!(policy.wait_time(0), Duration::from_millis(250));
        assert_eq!(policy.wait_time(7), Duration::from_millis(250));
    }

    #[test]
    fn exponential_is_monotonic_and_bounded() {
        let policy =
            RetryPolicy::exponential(64, Duration::from_millis(10), Duration::from_secs(2));
        let mut prev = Duration::ZERO;
        for attempt in 0..64 {
            let wait = policy.wait_time(attempt);
            assert!(wait >= prev);
            assert!(wait <= Duration::from_secs(2));
            prev = wait;
        }
    }
}
