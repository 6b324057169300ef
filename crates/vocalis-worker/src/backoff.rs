//! Exponential backoff for webhook deliveries.

/// `2^attempt` seconds between attempts, giving up after `max_attempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    max_attempts: i32,
}

impl BackoffPolicy {
    /// Create a policy allowing `max_attempts` sends in total.
    pub fn new(max_attempts: i32) -> Self {
        Self { max_attempts }
    }

    /// Wait after the `attempt`-th failed send (1-based).
    pub fn delay_for(&self, attempt: i32) -> chrono::Duration {
        let exponent = attempt.clamp(0, 30) as u32;
        chrono::Duration::seconds(2_i64.pow(exponent))
    }

    /// Whether `attempts` sends use up the budget.
    pub fn is_exhausted(&self, attempts: i32) -> bool {
        attempts >= self.max_attempts
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(5)
    }
}
