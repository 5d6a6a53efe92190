//! Block/chunk partitioning.
//!
//! Layout of a file on the wire:
//!
//! ```text
//! |----------------------------- file -----------------------------|
//! |------ block ------|------ block ------|------ block ------|...
//! |- chunk -|- chunk -|- chunk -|- chunk -|- chunk -|- chunk -|...
//! ```
//!
//! Every block except the last is exactly 4 MiB; the last carries the
//! remainder. Chunks subdivide a block at a configurable granularity and
//! are clamped to the bytes the block actually has left.

use blocklift_protocol::BLOCK_SIZE;

/// Chunk granularity used when the caller does not choose one. Smaller than
/// a block so progress is visible; setting chunk size equal to
/// [`BLOCK_SIZE`] makes every block single-chunk and removes the in-block
/// ordering dependency entirely.
pub const DEFAULT_CHUNK_SIZE: u64 = 2 * 1024 * 1024;

/// One block of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    /// Position in file order; assembly consumes contexts in this order.
    pub index: usize,
    /// Byte offset of the block within the file.
    pub offset: u64,
    /// Block length; `BLOCK_SIZE` except possibly for the last block.
    pub size: u64,
}

/// One chunk within a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    /// Position within the block; chunk 0 creates the block.
    pub index: usize,
    /// Byte offset within the block (not within the file).
    pub offset_in_block: u64,
    pub size: u64,
}

impl BlockSpan {
    /// Chunk layout of this block for the given chunk size. Never empty: a
    /// zero-size block degenerates to one empty chunk.
    pub fn chunks(&self, chunk_size: u64) -> Vec<ChunkSpan> {
        if self.size == 0 {
            return vec![ChunkSpan {
                index: 0,
                offset_in_block: 0,
                size: 0,
            }];
        }

        let mut chunks = Vec::new();
        let mut offset = 0u64;
        while offset < self.size {
            let size = chunk_size.min(self.size - offset);
            chunks.push(ChunkSpan {
                index: chunks.len(),
                offset_in_block: offset,
                size,
            });
            offset += size;
        }
        chunks
    }
}

/// The full partitioning of one upload.
#[derive(Debug, Clone)]
pub struct UploadPlan {
    total_size: u64,
    chunk_size: u64,
    blocks: Vec<BlockSpan>,
}

impl UploadPlan {
    /// Partitions `total_size` bytes into blocks. A `chunk_size` of zero
    /// falls back to [`DEFAULT_CHUNK_SIZE`]; anything above [`BLOCK_SIZE`]
    /// is clamped down to it.
    pub fn new(total_size: u64, chunk_size: u64) -> Self {
        let chunk_size = match chunk_size {
            0 => DEFAULT_CHUNK_SIZE,
            s => s.min(BLOCK_SIZE),
        };

        let mut blocks = Vec::new();
        if total_size == 0 {
            blocks.push(BlockSpan {
                index: 0,
                offset: 0,
                size: 0,
            });
        } else {
            let mut offset = 0u64;
            while offset < total_size {
                let size = BLOCK_SIZE.min(total_size - offset);
                blocks.push(BlockSpan {
                    index: blocks.len(),
                    offset,
                    size,
                });
                offset += size;
            }
        }

        Self {
            total_size,
            chunk_size,
            blocks,
        }
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn blocks(&self) -> &[BlockSpan] {
        &self.blocks
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}
