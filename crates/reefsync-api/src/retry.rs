// Bounded retry policy shared by fetch and push.

use std::time::Duration;

/// Default number of attempts per fetch or push.
pub const HTTP_MAX_RETRY: u32 = 5;

/// Default pause between two attempts.
pub const HTTP_DELAY_BETWEEN_RETRY: Duration = Duration::from_secs(2);

/// Fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never less than 1.
    pub max_attempts: u32,
    /// Sleep between two consecutive attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: HTTP_MAX_RETRY,
            delay: HTTP_DELAY_BETWEEN_RETRY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Whether another attempt is allowed after `attempts` have failed.
    pub fn allows(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(policy.max_attempts, 1);
        assert!(policy.allows(0));
        assert!(!policy.allows(1));
    }

    #[test]
    fn default_matches_device_firmware_expectations() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay, Duration::from_secs(2));
        assert!(policy.allows(4));
        assert!(!policy.allows(5));
    }
}
