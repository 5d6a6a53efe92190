//! Retry and host-switch orchestration.
//!
//! Each network attempt reports its outcome as a [`Verdict`] value; the
//! orchestrator loop in [`run`] consumes verdicts as data and decides
//! whether to re-attempt, move to a different host first, or give up. The
//! loop knows nothing about upload semantics — callers hand it a
//! [`RetryOp`] capability that supplies hosts and performs one attempt.

mod orchestrator;
mod policy;

pub use orchestrator::{RetryOp, Verdict, run};
pub use policy::RetryPolicy;

/// Terminal failure of a retried operation.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// The retry budget was spent; carries the last underlying failure and
    /// the host it happened on.
    #[error("failed after {attempts} retry attempts (last host: {host}): {source}")]
    Exhausted {
        attempts: u32,
        host: String,
        source: E,
    },

    /// A non-retryable outcome; the original error passes through unwrapped.
    #[error(transparent)]
    Fatal(#[from] E),
}

impl<E> RetryError<E> {
    /// The underlying error, whichever way the operation ended.
    pub fn into_source(self) -> E {
        match self {
            RetryError::Exhausted { source, .. } => source,
            RetryError::Fatal(source) => source,
        }
    }
}
