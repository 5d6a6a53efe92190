//! URL construction for the three upload calls.
//!
//! Path layout:
//! - `POST {host}/mkblk/{blockSize}` — create a block, body = first chunk
//! - `POST {host}/bput/{ctx}/{chunkOffset}` — append a chunk, body = chunk
//! - `POST {host}/mkfile/{size}[/key/{b64}][/fname/{b64}][/x:var/{b64}...]`
//!   — assemble, body = newline-joined ctx list
//!
//! Optional `mkfile` segments carry their values URL-safe base64 encoded.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;

use crate::ProtocolError;

/// Builds the block-creation URL.
pub fn make_block_url(host: &str, block_size: u64) -> String {
    format!("{}/mkblk/{}", host.trim_end_matches('/'), block_size)
}

/// Builds the chunk-append URL.
///
/// `chunk_offset` is the chunk's start offset within its block, not within
/// the file.
pub fn put_chunk_url(host: &str, ctx: &str, chunk_offset: u64) -> Result<String, ProtocolError> {
    if ctx.is_empty() {
        return Err(ProtocolError::EmptyCtx);
    }
    Ok(format!(
        "{}/bput/{}/{}",
        host.trim_end_matches('/'),
        ctx,
        chunk_offset
    ))
}

/// Builds the file-assembly URL.
///
/// Custom variable names must carry the `x:` prefix; their values (and the
/// optional key and file name) are URL-safe base64 encoded path segments.
pub fn make_file_url(
    host: &str,
    total_size: u64,
    key: Option<&str>,
    file_name: Option<&str>,
    custom_vars: &[(String, String)],
) -> Result<String, ProtocolError> {
    let mut url = format!("{}/mkfile/{}", host.trim_end_matches('/'), total_size);

    if let Some(key) = key {
        url.push_str("/key/");
        url.push_str(&URL_SAFE.encode(key));
    }
    if let Some(name) = file_name {
        url.push_str("/fname/");
        url.push_str(&URL_SAFE.encode(name));
    }
    for (name, value) in custom_vars {
        if !name.starts_with("x:") {
            return Err(ProtocolError::InvalidCustomVar(name.clone()));
        }
        url.push('/');
        url.push_str(name);
        url.push('/');
        url.push_str(&URL_SAFE.encode(value));
    }

    Ok(url)
}

/// Joins per-block contexts into the `mkfile` request body.
///
/// Order is load-bearing: the server assembles blocks in the order their
/// contexts appear here.
pub fn make_file_body(block_ctxs: &[String]) -> Vec<u8> {
    block_ctxs.join("\n").into_bytes()
}
