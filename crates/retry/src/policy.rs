//! Retry policy knobs.

use std::time::Duration;

/// Policy for one logical operation (not one HTTP byte exchange).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Failed attempts allowed before the operation is exhausted.
    pub max_attempts: u32,
    /// Pause between a failed attempt and the next one.
    pub retry_interval: Duration,
    /// Statuses that must never trigger a host/region switch: the request
    /// itself is the problem (auth failure, oversized payload, expired
    /// token, and the service-specific permanent rejections). Kept as data
    /// because the correct set tracks the remote service, not first
    /// principles.
    pub non_switchable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_interval: Duration::from_millis(200),
            non_switchable_statuses: vec![401, 413, 419, 608, 614, 630],
        }
    }
}

impl RetryPolicy {
    /// Whether a host/region switch is merited for this response status:
    /// malformed/incomplete statuses below 200, or any failure status not in
    /// the non-switchable set.
    pub fn can_switch_host(&self, status: u16) -> bool {
        if status < 200 {
            return true;
        }
        status > 299 && !self.non_switchable_statuses.contains(&status)
    }

    /// Whether the status is a permanent rejection of the request.
    pub fn is_rejected(&self, status: u16) -> bool {
        status >= 200 && !(200..300).contains(&status) && !self.can_switch_host(status)
    }
}
