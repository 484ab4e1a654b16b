/*!
 * Exponential backoff and retry limits shared by every retry site.
 */

use std::fmt;
use std::time::Duration;

/// Exponential backoff: `min(2^attempt * unit, cap)`, no jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay after the first failed attempt
    pub unit: Duration,
    /// Upper bound for any single delay
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            unit: Duration::from_secs(1),
            cap: Duration::from_secs(60),
        }
    }
}

impl BackoffPolicy {
    /// Create a policy with a custom unit and cap
    pub fn new(unit: Duration, cap: Duration) -> Self {
        Self { unit, cap }
    }

    /// A policy that never sleeps
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Delay to wait after failed attempt `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        // 2^6 * unit already passes the default cap, keep the shift small
        let factor = 1u32 << attempt.min(16);
        self.unit.saturating_mul(factor).min(self.cap)
    }
}

/// How many attempts one batch may use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryLimit {
    /// Keep retrying until the backend answers usefully
    Unlimited,
    /// At most this many attempts (always at least one)
    Attempts(u32),
}

impl RetryLimit {
    /// Interpret a configured `max_retries`; `0` means unlimited
    pub fn from_config(max_retries: u32) -> Self {
        match max_retries {
            0 => Self::Unlimited,
            n => Self::Attempts(n),
        }
    }

    /// Whether attempt `attempt` (0-based) may still be made
    pub fn allows(&self, attempt: u32) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Attempts(max) => attempt < *max,
        }
    }

    /// Whether attempt `attempt` (0-based) is the final one allowed
    pub fn is_last(&self, attempt: u32) -> bool {
        match self {
            Self::Unlimited => false,
            Self::Attempts(max) => attempt + 1 >= *max,
        }
    }
}

impl fmt::Display for RetryLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlimited => write!(f, "unlimited"),
            Self::Attempts(n) => write!(f, "{}", n),
        }
    }
}
