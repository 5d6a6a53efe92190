//! Temporary host freezing.
//!
//! A failed host is frozen, not removed: transient faults clear, and the
//! host returns to candidacy once the freeze expires.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// How long a bad host stays out of rotation unless the caller says
/// otherwise.
pub const DEFAULT_FREEZE: Duration = Duration::from_secs(600);

/// Tracks which host domains are temporarily out of rotation.
#[derive(Debug, Clone, Default)]
pub struct HostFreezer {
    frozen_until: HashMap<String, Instant>,
}

impl HostFreezer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Freezes `domain` for `freeze` from now.
    pub fn mark(&mut self, domain: &str, freeze: Duration) {
        self.mark_at(domain, freeze, Instant::now());
    }

    /// Freezes `domain` for `freeze` from an explicit instant.
    pub fn mark_at(&mut self, domain: &str, freeze: Duration, now: Instant) {
        self.frozen_until.insert(domain.to_string(), now + freeze);
    }

    /// Whether `domain` is currently frozen.
    pub fn is_frozen(&self, domain: &str) -> bool {
        self.is_frozen_at(domain, Instant::now())
    }

    /// Whether `domain` is frozen at an explicit instant.
    pub fn is_frozen_at(&self, domain: &str, now: Instant) -> bool {
        self.frozen_until
            .get(domain)
            .is_some_and(|until| *until > now)
    }

    /// Drops expired entries. Called opportunistically; correctness does not
    /// depend on it.
    pub fn prune(&mut self, now: Instant) {
        self.frozen_until.retain(|_, until| *until > now);
    }
}
