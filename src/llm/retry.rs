//! Retry policy for generation calls.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound on the number of attempts made for one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryLimit {
    /// At most this many attempts in total (the first call included).
    Limited(u64),
    /// Keep trying until a definitive answer arrives.
    Unlimited,
}

impl RetryLimit {
    /// Whether another attempt is allowed after `attempts_made`.
    pub fn allows(&self, attempts_made: u64) -> bool {
        match self {
            RetryLimit::Limited(max) => attempts_made < *max,
            RetryLimit::Unlimited => true,
        }
    }
}

impl fmt::Display for RetryLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryLimit::Limited(max) => write!(f, "{}", max),
            RetryLimit::Unlimited => write!(f, "unlimited"),
        }
    }
}

impl FromStr for RetryLimit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("unlimited") {
            return Ok(RetryLimit::Unlimited);
        }
        match s.parse::<u64>() {
            Ok(0) => Err("max attempts must be at least 1 (or 'unlimited')".to_string()),
            Ok(max) => Ok(RetryLimit::Limited(max)),
            Err(_) => Err(format!(
                "invalid retry limit '{}': expected a positive integer or 'unlimited'",
                s
            )),
        }
    }
}

/// How often and how patiently to retry transient failures.
///
/// The same `delay` is waited before every retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub limit: RetryLimit,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            limit: RetryLimit::Limited(10),
            delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(limit: RetryLimit, delay: Duration) -> Self {
        Self { limit, delay }
    }

    /// Retry forever with the given delay.
    pub fn unlimited(delay: Duration) -> Self {
        Self::new(RetryLimit::Unlimited, delay)
    }

    /// Whether another attempt is allowed after `attempts_made`.
    pub fn should_retry(&self, attempts_made: u64) -> bool {
        self.limit.allows(attempts_made)
    }
}
