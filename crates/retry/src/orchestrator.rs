//! The retry loop.

use std::future::Future;

use tracing::{debug, warn};

use crate::{RetryError, RetryPolicy};

/// Outcome of one attempt, classified by the operation itself.
#[derive(Debug)]
pub enum Verdict<T, E> {
    /// Done; stop retrying.
    Success(T),
    /// Transient failure; try again on the same host.
    Retryable(E),
    /// Transient failure attributable to the host; obtain a different host
    /// before the next attempt.
    SwitchAndRetry(E),
    /// Permanent failure; propagate unwrapped.
    Fatal(E),
}

/// Capability the orchestrator drives: supply a host, perform one attempt
/// against it, and move to an alternate host when asked.
pub trait RetryOp {
    type Output;
    type Error;

    /// The host the next attempt should target.
    fn host(&mut self) -> Result<String, Self::Error>;

    /// One network attempt against `host`.
    fn attempt(
        &mut self,
        host: &str,
    ) -> impl Future<Output = Verdict<Self::Output, Self::Error>> + Send;

    /// Tries to make `host()` return something different from `failed`.
    /// Returns `false` when no alternate exists; the loop then re-attempts
    /// wherever `host()` points.
    fn switch_host(&mut self, failed: &str) -> bool;
}

/// Runs `op` until success, a fatal outcome, or an exhausted retry budget.
///
/// Attempt accounting: every non-success verdict increments the count; when
/// it reaches `policy.max_attempts` the last failure surfaces as
/// [`RetryError::Exhausted`]. After a `SwitchAndRetry` verdict the next
/// attempt never targets the host that just failed if any alternate exists.
pub async fn run<O: RetryOp>(
    policy: &RetryPolicy,
    op: &mut O,
) -> Result<O::Output, RetryError<O::Error>> {
    let mut attempts: u32 = 0;

    loop {
        let host = op.host().map_err(RetryError::Fatal)?;

        let (error, switch) = match op.attempt(&host).await {
            Verdict::Success(output) => return Ok(output),
            Verdict::Fatal(e) => return Err(RetryError::Fatal(e)),
            Verdict::Retryable(e) => (e, false),
            Verdict::SwitchAndRetry(e) => (e, true),
        };

        attempts += 1;
        if attempts >= policy.max_attempts {
            return Err(RetryError::Exhausted {
                attempts,
                host,
                source: error,
            });
        }

        if switch {
            let switched = op.switch_host(&host);
            debug!(failed = %host, switched, attempt = attempts, "switching host before retry");
            if !switched {
                warn!(host = %host, "no alternate host available, retrying in place");
            }
        } else {
            debug!(host = %host, attempt = attempts, "retrying");
        }

        if !policy.retry_interval.is_zero() {
            tokio::time::sleep(policy.retry_interval).await;
        }
    }
}
