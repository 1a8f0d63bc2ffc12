use std::time::Duration;

/// High-level classification of an error, used for logging and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operation timed out (connect/read).
    Timeout,
    /// Server asked us to slow down (e.g. 429, 503).
    Throttled,
    /// Network-level failure (connection reset, DNS, etc.).
    Connection,
    /// Server error other than throttling (5xx).
    Http5xx(u16),
    /// Response arrived but its body does not fit the requested range.
    Malformed,
    /// Anything else (4xx, unexpected curl errors).
    Other,
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Give up; the last error is terminal.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Bounded retry with linearly growing delay: the wait after attempt `n`
/// is `n * delay_step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Delay added per failed attempt.
    pub delay_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay_step: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Decide what to do after `attempt` (1-based) failed.
    pub fn decide(&self, attempt: u32) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::NoRetry;
        }
        RetryDecision::RetryAfter(self.delay_step.saturating_mul(attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_backoff() {
        let p = RetryPolicy::default();
        assert_eq!(p.decide(1), RetryDecision::RetryAfter(Duration::from_secs(1)));
        assert_eq!(p.decide(2), RetryDecision::RetryAfter(Duration::from_secs(2)));
        assert_eq!(p.decide(9), RetryDecision::RetryAfter(Duration::from_secs(9)));
    }

    #[test]
    fn respects_max_attempts() {
        let p = RetryPolicy::default();
        assert_eq!(p.decide(10), RetryDecision::NoRetry);

        let single = RetryPolicy {
            max_attempts: 1,
            delay_step: Duration::from_millis(5),
        };
        assert_eq!(single.decide(1), RetryDecision::NoRetry);
    }
}
