//! One protocol call shaped for the retry orchestrator.
//!
//! Each step owns everything needed to rebuild its request against whatever
//! host the router hands out next, and classifies the outcome of every
//! attempt as a [`Verdict`] for the retry loop.

use blocklift_protocol::{
    ChunkAck, FileAck, UploadToken, make_block_url, make_file_url, put_chunk_url,
};
use blocklift_region::{RegionError, RegionRouter};
use blocklift_retry::{RetryOp, RetryPolicy, Verdict};
use blocklift_transport::{Request, Response, Transport, TransportError};

const OCTET_STREAM: &str = "application/octet-stream";

/// Failure of a single protocol step, before retry accounting.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Permanent rejection: the request, not the host, is the problem.
    #[error("server rejected request (status {status}): {body}")]
    Rejected { status: u16, body: String },

    /// Transient server failure; carried as the cause through retries.
    #[error("server transient failure (status {status}): {body}")]
    Transient { status: u16, body: String },

    /// The exchange broke a protocol invariant (integrity mismatch,
    /// unusable context). Never retried: the bytes were already accepted
    /// once, resending them would corrupt the block.
    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error(transparent)]
    Region(#[from] RegionError),
}

/// Which of the two chunk-level calls a [`ChunkStep`] performs.
pub(crate) enum ChunkCall<'a> {
    MakeBlock { block_size: u64 },
    PutChunk { ctx: &'a str, offset: u64 },
}

/// A block-creation or chunk-append attempt.
pub(crate) struct ChunkStep<'a, T> {
    pub transport: &'a T,
    pub router: &'a RegionRouter,
    pub token: &'a UploadToken,
    pub policy: &'a RetryPolicy,
    pub call: ChunkCall<'a>,
    pub body: &'a [u8],
    /// Local CRC32 of `body`; the server must agree.
    pub crc32: u32,
    /// Where the server's next-chunk offset must land: this chunk's end
    /// offset within the block.
    pub expected_offset: u64,
}

impl<T: Transport> RetryOp for ChunkStep<'_, T> {
    type Output = ChunkAck;
    type Error = StepError;

    fn host(&mut self) -> Result<String, StepError> {
        Ok(self.router.up_host(None)?.url)
    }

    async fn attempt(&mut self, host: &str) -> Verdict<ChunkAck, StepError> {
        let url = match &self.call {
            ChunkCall::MakeBlock { block_size } => make_block_url(host, *block_size),
            ChunkCall::PutChunk { ctx, offset } => match put_chunk_url(host, ctx, *offset) {
                Ok(url) => url,
                Err(e) => return Verdict::Fatal(StepError::Protocol(e.to_string())),
            },
        };

        let request = Request::post(url)
            .header("Authorization", self.token.authorization())
            .body(self.body.to_vec(), OCTET_STREAM);

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(error) => return verdict_for_transport(error),
        };
        if !response.is_ok() {
            return verdict_for_status(self.policy, response);
        }

        let ack: ChunkAck = match response.json() {
            Ok(ack) => ack,
            Err(error) => return verdict_for_transport(error),
        };
        if ack.crc32 != self.crc32 {
            return Verdict::Fatal(StepError::Protocol(format!(
                "crc32 mismatch: sent {}, server saw {}",
                self.crc32, ack.crc32
            )));
        }
        if ack.offset != self.expected_offset {
            return Verdict::Fatal(StepError::Protocol(format!(
                "offset mismatch: expected {}, server reported {}",
                self.expected_offset, ack.offset
            )));
        }
        Verdict::Success(ack)
    }

    fn switch_host(&mut self, failed: &str) -> bool {
        self.router.switch_host(domain_of(failed))
    }
}

/// The file-assembly attempt.
pub(crate) struct FileStep<'a, T> {
    pub transport: &'a T,
    pub router: &'a RegionRouter,
    pub token: &'a UploadToken,
    pub policy: &'a RetryPolicy,
    pub total_size: u64,
    pub key: Option<&'a str>,
    pub file_name: Option<&'a str>,
    pub custom_vars: &'a [(String, String)],
    /// Newline-joined block contexts, in file order.
    pub body: Vec<u8>,
}

impl<T: Transport> RetryOp for FileStep<'_, T> {
    type Output = FileAck;
    type Error = StepError;

    fn host(&mut self) -> Result<String, StepError> {
        Ok(self.router.up_host(None)?.url)
    }

    async fn attempt(&mut self, host: &str) -> Verdict<FileAck, StepError> {
        let url = match make_file_url(
            host,
            self.total_size,
            self.key,
            self.file_name,
            self.custom_vars,
        ) {
            Ok(url) => url,
            Err(e) => return Verdict::Fatal(StepError::Protocol(e.to_string())),
        };

        let request = Request::post(url)
            .header("Authorization", self.token.authorization())
            .body(self.body.clone(), "text/plain");

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(error) => return verdict_for_transport(error),
        };
        if !response.is_ok() {
            return verdict_for_status(self.policy, response);
        }
        match response.json() {
            Ok(ack) => Verdict::Success(ack),
            Err(error) => verdict_for_transport(error),
        }
    }

    fn switch_host(&mut self, failed: &str) -> bool {
        self.router.switch_host(domain_of(failed))
    }
}

fn verdict_for_transport<T>(error: TransportError) -> Verdict<T, StepError> {
    if error.is_unrecoverable() {
        Verdict::Fatal(error.into())
    } else if error.needs_switch_server() {
        Verdict::SwitchAndRetry(error.into())
    } else {
        Verdict::Retryable(error.into())
    }
}

fn verdict_for_status<T>(policy: &RetryPolicy, response: Response) -> Verdict<T, StepError> {
    let status = response.status;
    let error = if response.needs_retry() {
        StepError::Transient {
            status,
            body: response.text(),
        }
    } else {
        StepError::Rejected {
            status,
            body: response.text(),
        }
    };

    if !policy.can_switch_host(status) {
        Verdict::Fatal(error)
    } else if response.needs_retry() && !response.needs_switch_server() {
        Verdict::Retryable(error)
    } else {
        Verdict::SwitchAndRetry(error)
    }
}

/// Strips the scheme off a host URL for freeze-table bookkeeping.
fn domain_of(url: &str) -> &str {
    url.split_once("://").map_or(url, |(_, domain)| domain)
}
