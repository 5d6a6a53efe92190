//! Transport doubles shared by the crate's tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use blocklift_transport::{Request, Response, Transport, TransportError};

/// Replays a fixed list of replies, recording every request.
pub(crate) struct ScriptTransport {
    script: Mutex<VecDeque<Result<(u16, String), TransportError>>>,
    log: Mutex<Vec<Request>>,
}

impl ScriptTransport {
    pub fn replies(replies: Vec<Result<(u16, String), TransportError>>) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<Request> {
        self.log.lock().unwrap().clone()
    }
}

impl Transport for ScriptTransport {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        self.log.lock().unwrap().push(request);
        match self.script.lock().unwrap().pop_front() {
            Some(Ok((status, body))) => Ok(Response {
                status,
                body: body.into_bytes(),
            }),
            Some(Err(error)) => Err(error),
            None => Err(TransportError::Io("script exhausted".into())),
        }
    }
}

// ---------------------------------------------------------------------------
// FakeServer
// ---------------------------------------------------------------------------

/// An in-process stand-in for the upload service that enforces the v1
/// protocol: blocks are created with `mkblk`, each `bput` must carry the
/// latest context of its block at the exact next offset, and `mkfile`
/// accepts only terminal contexts for fully-uploaded blocks.
pub(crate) struct FakeServer {
    state: Mutex<ServerState>,
    /// `expired_at` handed out on every ack: unix-now plus this many seconds.
    expire_offset: i64,
    /// Queued injected failures: each request whose path contains the
    /// pattern at the queue front consumes it and fails with the error
    /// instead of reaching the "server".
    fail_queue: Mutex<VecDeque<(String, TransportError)>>,
}

#[derive(Default)]
struct ServerState {
    next_block: usize,
    blocks: HashMap<usize, BlockState>,
    requests: Vec<SeenRequest>,
    assembled: Option<AssembledFile>,
}

struct BlockState {
    declared_size: u64,
    bytes: u64,
    chunks: usize,
    latest_ctx: String,
}

#[derive(Debug, Clone)]
pub(crate) struct SeenRequest {
    pub host: String,
    pub path: String,
    pub body_len: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct AssembledFile {
    pub total_size: u64,
    pub ctxs: Vec<String>,
    pub key: Option<String>,
    pub fname: Option<String>,
    pub custom: Vec<(String, String)>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ServerState::default()),
            expire_offset: 3600,
            fail_queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Acks will expire this many seconds from now.
    pub fn with_expire_offset(mut self, seconds: i64) -> Self {
        self.expire_offset = seconds;
        self
    }

    /// Queues a one-shot failure for the next request whose path contains
    /// `pattern`.
    pub fn fail_once(&self, pattern: &str, error: TransportError) {
        self.fail_queue
            .lock()
            .unwrap()
            .push_back((pattern.to_string(), error));
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn assembled(&self) -> Option<AssembledFile> {
        self.state.lock().unwrap().assembled.clone()
    }

    /// Declared size of a block created through `mkblk`.
    pub fn block_size_of(&self, id: usize) -> Option<u64> {
        self.state
            .lock()
            .unwrap()
            .blocks
            .get(&id)
            .map(|b| b.declared_size)
    }

    fn expired_at(&self) -> i64 {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        now + self.expire_offset
    }

    fn ack(&self, ctx: &str, offset: u64, body: &[u8]) -> Response {
        let payload = serde_json::json!({
            "ctx": ctx,
            "checksum": "fake-checksum",
            "offset": offset,
            "host": "",
            "crc32": crc32fast::hash(body),
            "expired_at": self.expired_at(),
        });
        Response {
            status: 200,
            body: payload.to_string().into_bytes(),
        }
    }

    fn reject(status: u16, message: &str) -> Response {
        Response {
            status,
            body: serde_json::json!({ "error": message }).to_string().into_bytes(),
        }
    }

    fn handle_make_block(&self, rest: &str, body: &[u8]) -> Response {
        let Ok(declared_size) = rest.parse::<u64>() else {
            return Self::reject(400, "bad block size");
        };
        if body.len() as u64 > declared_size {
            return Self::reject(400, "first chunk exceeds block size");
        }

        let mut state = self.state.lock().unwrap();
        let id = state.next_block;
        state.next_block += 1;
        let ctx = format!("ctx-{id}-0");
        state.blocks.insert(
            id,
            BlockState {
                declared_size,
                bytes: body.len() as u64,
                chunks: 1,
                latest_ctx: ctx.clone(),
            },
        );
        drop(state);
        self.ack(&ctx, body.len() as u64, body)
    }

    fn handle_put_chunk(&self, rest: &str, body: &[u8]) -> Response {
        let Some((ctx, offset)) = rest.rsplit_once('/') else {
            return Self::reject(400, "bad bput path");
        };
        let Ok(offset) = offset.parse::<u64>() else {
            return Self::reject(400, "bad offset");
        };
        let Some(id) = block_id_of(ctx) else {
            return Self::reject(701, "unknown ctx");
        };

        let mut state = self.state.lock().unwrap();
        let Some(block) = state.blocks.get_mut(&id) else {
            return Self::reject(701, "unknown block");
        };
        if block.latest_ctx != ctx {
            return Self::reject(701, "ctx is not the latest for its block");
        }
        if offset != block.bytes {
            return Self::reject(701, "chunk out of order");
        }
        if block.bytes + body.len() as u64 > block.declared_size {
            return Self::reject(400, "chunk overruns block");
        }

        block.bytes += body.len() as u64;
        block.chunks += 1;
        let ctx = format!("ctx-{id}-{}", block.chunks - 1);
        block.latest_ctx = ctx.clone();
        let offset = block.bytes;
        drop(state);
        self.ack(&ctx, offset, body)
    }

    fn handle_make_file(&self, rest: &str, body: &[u8]) -> Response {
        let mut segments = rest.split('/');
        let Some(Ok(total_size)) = segments.next().map(str::parse::<u64>) else {
            return Self::reject(400, "bad size");
        };

        let mut key = None;
        let mut fname = None;
        let mut custom = Vec::new();
        while let Some(name) = segments.next() {
            let Some(value) = segments.next() else {
                return Self::reject(400, "dangling path segment");
            };
            let Ok(decoded) = URL_SAFE.decode(value) else {
                return Self::reject(400, "bad base64 segment");
            };
            let decoded = String::from_utf8_lossy(&decoded).into_owned();
            match name {
                "key" => key = Some(decoded),
                "fname" => fname = Some(decoded),
                name if name.starts_with("x:") => {
                    custom.push((name.trim_start_matches("x:").to_string(), decoded));
                }
                _ => return Self::reject(400, "unknown segment"),
            }
        }

        let ctxs: Vec<String> = String::from_utf8_lossy(body)
            .split('\n')
            .map(str::to_string)
            .collect();

        let state = self.state.lock().unwrap();
        let mut assembled_bytes = 0u64;
        for ctx in &ctxs {
            let Some(id) = block_id_of(ctx) else {
                return Self::reject(701, "unknown ctx in assembly");
            };
            let Some(block) = state.blocks.get(&id) else {
                return Self::reject(701, "unknown block in assembly");
            };
            if &block.latest_ctx != ctx {
                return Self::reject(701, "non-terminal ctx in assembly");
            }
            if block.bytes != block.declared_size {
                return Self::reject(400, "incomplete block in assembly");
            }
            assembled_bytes += block.bytes;
        }
        if assembled_bytes != total_size {
            return Self::reject(400, "assembled size mismatch");
        }
        drop(state);

        let mut payload = serde_json::json!({
            "key": key.clone().unwrap_or_else(|| "unnamed".to_string()),
            "hash": format!("fake-etag-{total_size}"),
            "fsize": total_size,
        });
        if let Some(fname) = &fname {
            payload["fname"] = serde_json::json!(fname);
        }
        for (name, value) in &custom {
            payload[name.as_str()] = serde_json::json!(value);
        }

        self.state.lock().unwrap().assembled = Some(AssembledFile {
            total_size,
            ctxs,
            key,
            fname,
            custom,
        });

        Response {
            status: 200,
            body: payload.to_string().into_bytes(),
        }
    }
}

impl Transport for FakeServer {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let after_scheme = request
            .url
            .split_once("://")
            .map_or(request.url.as_str(), |(_, rest)| rest);
        let (host, path) = match after_scheme.split_once('/') {
            Some((host, path)) => (host.to_string(), format!("/{path}")),
            None => (after_scheme.to_string(), "/".to_string()),
        };

        {
            let mut queue = self.fail_queue.lock().unwrap();
            let matches = queue
                .front()
                .is_some_and(|(pattern, _)| path.contains(pattern));
            if matches && let Some((_, error)) = queue.pop_front() {
                return Err(error);
            }
        }

        self.state.lock().unwrap().requests.push(SeenRequest {
            host,
            path: path.clone(),
            body_len: request.body.len(),
        });

        if let Some(rest) = path.strip_prefix("/mkblk/") {
            Ok(self.handle_make_block(rest, &request.body))
        } else if let Some(rest) = path.strip_prefix("/bput/") {
            Ok(self.handle_put_chunk(rest, &request.body))
        } else if let Some(rest) = path.strip_prefix("/mkfile/") {
            Ok(self.handle_make_file(rest, &request.body))
        } else {
            Ok(Self::reject(400, "unknown endpoint"))
        }
    }
}

/// Contexts are minted as `ctx-{block}-{chunk}`.
fn block_id_of(ctx: &str) -> Option<usize> {
    ctx.strip_prefix("ctx-")?.split('-').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn post(server: &FakeServer, path: &str, body: &[u8]) -> Response {
        server
            .send(Request::post(format!("https://up.example.com{path}")).body(body.to_vec(), "application/octet-stream"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn out_of_order_chunk_is_rejected() {
        let server = FakeServer::new();
        let ack = post(&server, "/mkblk/8", b"abcd").await;
        assert_eq!(ack.status, 200);

        // Correct continuation works.
        let ok = post(&server, "/bput/ctx-0-0/4", b"ef").await;
        assert_eq!(ok.status, 200);

        // Reusing the superseded context must be rejected.
        let stale = post(&server, "/bput/ctx-0-0/6", b"gh").await;
        assert_eq!(stale.status, 701);

        // Right context, wrong offset: also rejected.
        let skewed = post(&server, "/bput/ctx-0-1/4", b"gh").await;
        assert_eq!(skewed.status, 701);
    }

    #[tokio::test]
    async fn assembly_rejects_non_terminal_context() {
        let server = FakeServer::new();
        post(&server, "/mkblk/4", b"abcd").await;
        post(&server, "/mkblk/4", b"wxyz").await;

        // Block 1's context is fine, but an unknown one is not.
        let resp = server
            .send(
                Request::post("https://up.example.com/mkfile/8")
                    .body(b"ctx-0-0\nctx-9-0".to_vec(), "text/plain"),
            )
            .await
            .unwrap();
        assert_eq!(resp.status, 701);

        let good = server
            .send(
                Request::post("https://up.example.com/mkfile/8")
                    .body(b"ctx-0-0\nctx-1-0".to_vec(), "text/plain"),
            )
            .await
            .unwrap();
        assert_eq!(good.status, 200);
        assert_eq!(server.assembled().unwrap().ctxs.len(), 2);
    }

    #[tokio::test]
    async fn assembly_rejects_incomplete_block() {
        let server = FakeServer::new();
        // Declared 8 bytes but only 4 uploaded.
        post(&server, "/mkblk/8", b"abcd").await;

        let resp = server
            .send(
                Request::post("https://up.example.com/mkfile/8")
                    .body(b"ctx-0-0".to_vec(), "text/plain"),
            )
            .await
            .unwrap();
        assert_eq!(resp.status, 400);
    }
}
