//! Resumable block/chunk upload sessions.
//!
//! The crate ties the rest of the engine together: an [`UploadSession`]
//! partitions its source with an [`UploadPlan`], drives every protocol call
//! through the retry orchestrator against hosts the region router hands
//! out, verifies integrity on each acknowledgement, and assembles the final
//! object from the ordered block contexts.

mod call;
mod plan;
mod progress;
mod session;
mod source;
#[cfg(test)]
mod testutil;

pub use call::StepError;
pub use plan::{BlockSpan, ChunkSpan, DEFAULT_CHUNK_SIZE, UploadPlan};
pub use progress::{SpeedCalculator, UploadEvent};
pub use session::{UploadOptions, UploadOutcome, UploadSession};
pub use source::{ChunkSource, FileSource, MemorySource};

// The pieces callers need alongside a session.
pub use blocklift_protocol::{BLOCK_SIZE, FileAck, UploadToken};
pub use blocklift_retry::{RetryError, RetryPolicy};

use std::fmt;

use blocklift_protocol::ProtocolError;
use blocklift_region::RegionError;

/// Which protocol call a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    MakeBlock,
    PutChunk,
    MakeFile,
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadPhase::MakeBlock => "block creation",
            UploadPhase::PutChunk => "chunk append",
            UploadPhase::MakeFile => "file assembly",
        };
        f.write_str(name)
    }
}

/// Terminal session failures, annotated with where in the file they struck.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("{phase} failed at block {block}, chunk {chunk}: {source}")]
    Step {
        phase: UploadPhase,
        block: usize,
        chunk: usize,
        #[source]
        source: RetryError<StepError>,
    },

    #[error("file assembly failed: {source}")]
    Assemble {
        #[source]
        source: RetryError<StepError>,
    },

    /// A block context would lapse before the next call could use it.
    #[error("block {block}: upload context expires too soon to continue")]
    CtxExpired { block: usize },

    #[error("upload cancelled")]
    Cancelled,

    #[error("source read failed: {0}")]
    Source(#[from] std::io::Error),

    #[error(transparent)]
    Region(#[from] RegionError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("upload worker failed: {0}")]
    Worker(String),
}
