//! Throttle recovery: sleep for the server-declared delay, then retry.
//!
//! A throttled response (HTTP 429) carries a `Retry-After` hint in seconds.
//! The gateway sleeps exactly that long and re-issues the identical request.
//! By default there is no retry ceiling and no jitter; [`ThrottleRetry`] can
//! cap attempts and spread retries out when several callers are throttled
//! at once.

use std::time::Duration;

/// Delay used when a throttled response carries no usable `Retry-After`.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Configuration for throttle recovery.
#[derive(Debug, Clone)]
pub struct ThrottleRetry {
    /// Maximum retries after the first throttled attempt (`None` = unbounded).
    pub max_retries: Option<u32>,
    /// Delay used when the server gives no hint.
    pub default_delay: Duration,
    /// Whether to stretch each delay by a small deterministic factor.
    pub jitter: bool,
}

impl Default for ThrottleRetry {
    fn default() -> Self {
        Self {
            max_retries: None,
            default_delay: DEFAULT_RETRY_AFTER,
            jitter: false,
        }
    }
}

impl ThrottleRetry {
    /// Cap the number of retries after the first throttled attempt.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Whether another retry is allowed after `retries_so_far` retries.
    pub fn allows_retry(&self, retries_so_far: u32) -> bool {
        self.max_retries.is_none_or(|max| retries_so_far < max)
    }

    /// Delay before retry number `attempt` (0-indexed) given the server hint.
    ///
    /// Jitter only ever lengthens the delay: retrying earlier than the
    /// server asked would just be throttled again.
    pub fn delay_for(&self, hint: Option<Duration>, attempt: u32) -> Duration {
        let base = hint.unwrap_or(self.default_delay);
        if !self.jitter {
            return base;
        }
        // Fixed spread, cycling every four attempts.
        let factor = match attempt % 4 {
            0 => 1.10,
            1 => 1.25,
            2 => 1.05,
            _ => 1.20,
        };
        Duration::try_from_secs_f64(base.as_secs_f64() * factor).unwrap_or(Duration::MAX)
    }
}

/// Parse a `Retry-After` header value given in whole or fractional seconds.
///
/// Returns `None` for missing, negative, non-numeric, or unrepresentably
/// large values (HTTP-date forms are not used by the design API).
pub fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    let secs: f64 = value?.trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}
