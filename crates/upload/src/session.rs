//! The resumable upload session.
//!
//! Drives the three-call protocol to completion for one file: `mkblk` for
//! the first chunk of every block, `bput` for the rest, one `mkfile` at the
//! end. Chunks inside a block are strictly sequential — each request embeds
//! the context the previous one returned — while blocks are independent and
//! may run concurrently behind an optional permit gate.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use blocklift_protocol::{ChunkAck, FileAck, ProtocolError, UploadToken, make_file_body};
use blocklift_region::RegionRouter;
use blocklift_retry::{RetryPolicy, run as retry_run};
use blocklift_transport::Transport;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::call::{ChunkCall, ChunkStep, FileStep};
use crate::plan::{BlockSpan, UploadPlan};
use crate::progress::UploadEvent;
use crate::source::ChunkSource;
use crate::{UploadError, UploadPhase};

/// Everything tunable about one upload, collapsed into named fields.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Object key to store under; server picks one when absent.
    pub key: Option<String>,
    /// Original file name echoed into object metadata.
    pub file_name: Option<String>,
    /// Custom variables; names must carry the `x:` prefix.
    pub custom_vars: Vec<(String, String)>,
    /// Chunk granularity; 0 means the default, values above the block size
    /// are clamped to it.
    pub chunk_size: u64,
    /// Maximum blocks in flight at once; `None` leaves it unbounded.
    pub concurrency: Option<usize>,
    /// A context must have at least this much lifetime left before it is
    /// spent on another call; otherwise the session fails fast instead of
    /// issuing a doomed request.
    pub ctx_expiry_margin: Duration,
    pub policy: RetryPolicy,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            key: None,
            file_name: None,
            custom_vars: Vec::new(),
            chunk_size: 0,
            concurrency: None,
            ctx_expiry_margin: Duration::from_secs(10),
            policy: RetryPolicy::default(),
        }
    }
}

/// What the server said about the assembled object.
#[derive(Debug)]
pub struct UploadOutcome {
    pub metadata: FileAck,
    pub total_bytes: u64,
    pub blocks: usize,
}

/// One file's journey through the chunked upload protocol.
pub struct UploadSession<T, S> {
    transport: Arc<T>,
    router: Arc<RegionRouter>,
    token: UploadToken,
    source: Arc<S>,
    options: UploadOptions,
    cancel: CancellationToken,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
}

impl<T, S> UploadSession<T, S>
where
    T: Transport + 'static,
    S: ChunkSource + 'static,
{
    pub fn new(
        transport: T,
        router: Arc<RegionRouter>,
        token: UploadToken,
        source: S,
        options: UploadOptions,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            transport: Arc::new(transport),
            router,
            token,
            source: Arc::new(source),
            options,
            cancel: CancellationToken::new(),
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Takes the progress event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    /// Abandons the rest of the upload. Workers notice at the next chunk
    /// boundary; the attempt already in flight completes or times out on
    /// its own so the remote block is never left mid-write.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Runs the upload to completion and returns the assembled object's
    /// metadata.
    pub async fn run(&self) -> Result<UploadOutcome, UploadError> {
        // Catch bad custom variables before any bytes move; assembly would
        // reject them anyway, after the whole file had been uploaded.
        for (name, _) in &self.options.custom_vars {
            if !name.starts_with("x:") {
                return Err(UploadError::Protocol(ProtocolError::InvalidCustomVar(
                    name.clone(),
                )));
            }
        }

        self.router.ensure_ready().await?;

        let total = self.source.len();
        let plan = UploadPlan::new(total, self.options.chunk_size);
        info!(
            total,
            blocks = plan.block_count(),
            chunk_size = plan.chunk_size(),
            "starting chunked upload"
        );

        let entries = self.upload_blocks(&plan).await?;

        if self.cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        // Assembly consumes every context at once; refuse to start with one
        // that is about to lapse.
        for entry in &entries {
            if !ctx_usable(entry.expired_at, self.options.ctx_expiry_margin) {
                return Err(UploadError::CtxExpired { block: entry.block });
            }
        }

        let metadata = self.make_file(&plan, &entries).await?;
        info!(blocks = entries.len(), total, "upload assembled");
        let _ = self.events_tx.try_send(UploadEvent::Completed {
            total,
            blocks: entries.len(),
        });

        Ok(UploadOutcome {
            metadata,
            total_bytes: total,
            blocks: plan.block_count(),
        })
    }

    async fn upload_blocks(&self, plan: &UploadPlan) -> Result<Vec<BlockCtx>, UploadError> {
        let gate = self
            .options
            .concurrency
            .map(|n| Arc::new(Semaphore::new(n.max(1))));
        let sent = Arc::new(AtomicU64::new(0));

        let mut workers: JoinSet<Result<BlockCtx, UploadError>> = JoinSet::new();
        for block in plan.blocks() {
            let job = BlockJob {
                transport: Arc::clone(&self.transport),
                router: Arc::clone(&self.router),
                token: self.token.clone(),
                policy: self.options.policy.clone(),
                source: Arc::clone(&self.source),
                block: *block,
                chunk_size: plan.chunk_size(),
                expiry_margin: self.options.ctx_expiry_margin,
                total: plan.total_size(),
                cancel: self.cancel.clone(),
                events: self.events_tx.clone(),
                sent: Arc::clone(&sent),
            };
            let gate = gate.clone();
            workers.spawn(async move {
                let _permit = match gate {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };
                job.run().await
            });
        }

        let mut entries: Vec<Option<BlockCtx>> = vec![None; plan.block_count()];
        let mut first_error: Option<UploadError> = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(entry)) => {
                    let block = entry.block;
                    entries[block] = Some(entry);
                }
                Ok(Err(error)) => {
                    if first_error.is_none() {
                        warn!(error = %error, "block upload failed, aborting session");
                        // Stop the remaining workers at their next chunk
                        // boundary; partial contexts are discarded.
                        self.cancel.cancel();
                        first_error = Some(error);
                    }
                }
                Err(join_error) => {
                    if first_error.is_none() {
                        self.cancel.cancel();
                        first_error = Some(UploadError::Worker(join_error.to_string()));
                    }
                }
            }
        }

        if let Some(error) = first_error {
            return Err(error);
        }

        let entries: Vec<BlockCtx> = entries.into_iter().flatten().collect();
        if entries.len() != plan.block_count() {
            return Err(UploadError::Worker("missing block context".into()));
        }
        Ok(entries)
    }

    async fn make_file(
        &self,
        plan: &UploadPlan,
        entries: &[BlockCtx],
    ) -> Result<FileAck, UploadError> {
        // `entries` is indexed by block, so this is file order.
        let ctxs: Vec<String> = entries.iter().map(|e| e.ctx.clone()).collect();

        let mut step = FileStep {
            transport: &*self.transport,
            router: &self.router,
            token: &self.token,
            policy: &self.options.policy,
            total_size: plan.total_size(),
            key: self.options.key.as_deref(),
            file_name: self.options.file_name.as_deref(),
            custom_vars: &self.options.custom_vars,
            body: make_file_body(&ctxs),
        };
        retry_run(&self.options.policy, &mut step)
            .await
            .map_err(|source| UploadError::Assemble { source })
    }
}

/// Final context of a completed block.
#[derive(Debug, Clone)]
struct BlockCtx {
    block: usize,
    ctx: String,
    expired_at: i64,
}

/// Uploads one block: chunk 0 through `mkblk`, the rest through `bput`,
/// each carrying the context the previous chunk returned.
struct BlockJob<T, S> {
    transport: Arc<T>,
    router: Arc<RegionRouter>,
    token: UploadToken,
    policy: RetryPolicy,
    source: Arc<S>,
    block: BlockSpan,
    chunk_size: u64,
    expiry_margin: Duration,
    total: u64,
    cancel: CancellationToken,
    events: mpsc::Sender<UploadEvent>,
    sent: Arc<AtomicU64>,
}

impl<T: Transport, S: ChunkSource> BlockJob<T, S> {
    async fn run(self) -> Result<BlockCtx, UploadError> {
        let chunks = self.block.chunks(self.chunk_size);
        debug!(block = self.block.index, size = self.block.size, chunks = chunks.len(), "block started");
        self.emit(UploadEvent::BlockStarted {
            block: self.block.index,
            size: self.block.size,
        });

        let mut last: Option<ChunkAck> = None;
        for chunk in &chunks {
            if self.cancel.is_cancelled() {
                return Err(UploadError::Cancelled);
            }

            let mut buf = vec![0u8; chunk.size as usize];
            if chunk.size > 0 {
                self.source
                    .read_at(self.block.offset + chunk.offset_in_block, &mut buf)?;
            }
            let crc32 = crc32fast::hash(&buf);
            let expected_offset = chunk.offset_in_block + chunk.size;

            let ack = match last.take() {
                None => {
                    let mut step = ChunkStep {
                        transport: &*self.transport,
                        router: &self.router,
                        token: &self.token,
                        policy: &self.policy,
                        call: ChunkCall::MakeBlock {
                            block_size: self.block.size,
                        },
                        body: &buf,
                        crc32,
                        expected_offset,
                    };
                    retry_run(&self.policy, &mut step).await.map_err(|source| {
                        UploadError::Step {
                            phase: UploadPhase::MakeBlock,
                            block: self.block.index,
                            chunk: chunk.index,
                            source,
                        }
                    })?
                }
                Some(prev) => {
                    if !ctx_usable(prev.expired_at, self.expiry_margin) {
                        return Err(UploadError::CtxExpired {
                            block: self.block.index,
                        });
                    }
                    let mut step = ChunkStep {
                        transport: &*self.transport,
                        router: &self.router,
                        token: &self.token,
                        policy: &self.policy,
                        call: ChunkCall::PutChunk {
                            ctx: &prev.ctx,
                            offset: chunk.offset_in_block,
                        },
                        body: &buf,
                        crc32,
                        expected_offset,
                    };
                    retry_run(&self.policy, &mut step).await.map_err(|source| {
                        UploadError::Step {
                            phase: UploadPhase::PutChunk,
                            block: self.block.index,
                            chunk: chunk.index,
                            source,
                        }
                    })?
                }
            };

            let bytes_sent = self.sent.fetch_add(chunk.size, Ordering::SeqCst) + chunk.size;
            trace!(block = self.block.index, chunk = chunk.index, bytes_sent, "chunk acknowledged");
            self.emit(UploadEvent::ChunkUploaded {
                block: self.block.index,
                chunk: chunk.index,
                bytes: chunk.size,
                bytes_sent,
                total: self.total,
            });
            last = Some(ack);
        }

        self.emit(UploadEvent::BlockCompleted {
            block: self.block.index,
        });
        let ack = last.ok_or_else(|| UploadError::Worker("block yielded no context".into()))?;
        Ok(BlockCtx {
            block: self.block.index,
            ctx: ack.ctx,
            expired_at: ack.expired_at,
        })
    }

    fn emit(&self, event: UploadEvent) {
        if let Err(e) = self.events.try_send(event) {
            trace!("progress event dropped: {e}");
        }
    }
}

/// Whether a context still has more than `margin` of declared lifetime
/// left. A non-positive `expired_at` means the server declared no expiry.
fn ctx_usable(expired_at: i64, margin: Duration) -> bool {
    if expired_at <= 0 {
        return true;
    }
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    expired_at - now > margin.as_secs() as i64
}
