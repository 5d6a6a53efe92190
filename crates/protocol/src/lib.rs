//! Wire protocol types and URL construction for the Blocklift upload engine.
//!
//! The v1 resumable protocol splits a file into 4 MiB blocks, each uploaded
//! as one or more chunks. Every chunk upload returns an opaque server-issued
//! continuation context (`ctx`); the final `ctx` of each block is collected
//! and consumed by a single file-assembly call.

pub mod messages;
pub mod paths;
pub mod token;

pub use messages::{ChunkAck, FileAck, HostList, QueryResponse, RegionHosts, UpHosts};
pub use paths::{make_block_url, make_file_body, make_file_url, put_chunk_url};
pub use token::UploadToken;

/// Block size mandated by the protocol: every block except the last is
/// exactly 4 MiB.
pub const BLOCK_SIZE: u64 = 4 * 1024 * 1024;

/// Errors produced while building protocol requests.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("custom variable {0:?} must start with \"x:\"")]
    InvalidCustomVar(String),

    #[error("empty continuation context")]
    EmptyCtx,
}
