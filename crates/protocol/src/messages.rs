//! Response payloads consumed from the upload and directory services.

use serde::{Deserialize, Serialize};

/// Acknowledgement returned by both block creation and chunk append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkAck {
    /// Opaque continuation context covering everything uploaded so far in
    /// this block. The next chunk of the same block must carry it.
    pub ctx: String,
    /// URL-safe base64 SHA-1 of the block so far, as reported by the server.
    #[serde(default)]
    pub checksum: String,
    /// Offset within the block at which the next chunk must start; equals
    /// the end offset of the chunk just uploaded.
    pub offset: u64,
    /// Host the server wants subsequent calls of this block routed to.
    #[serde(default)]
    pub host: String,
    /// CRC32 of the chunk body as received by the server.
    pub crc32: u32,
    /// Unix seconds after which `ctx` is no longer accepted.
    pub expired_at: i64,
}

/// Metadata returned by the file-assembly call.
///
/// The server echoes whatever the token's return-body template names, so all
/// fields are optional and unrecognized ones land in `extra` (this is how
/// `x:` custom variables come back, under their bare name).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileAck {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub fname: Option<String>,
    /// Size may be echoed as a number or a string depending on the template.
    #[serde(default)]
    pub fsize: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl FileAck {
    /// Looks up an echoed custom variable by its bare name (an `x:foo`
    /// variable is echoed as `foo`).
    pub fn custom(&self, name: &str) -> Option<&serde_json::Value> {
        self.extra.get(name)
    }

    /// Returns `fsize` as bytes regardless of whether the template echoed a
    /// number or a string.
    pub fn size(&self) -> Option<u64> {
        match self.fsize.as_ref()? {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Directory-service query
// ---------------------------------------------------------------------------

/// Topology answer from the directory service: one entry per region serving
/// the queried access key and bucket, in priority order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub hosts: Vec<RegionHosts>,
}

/// Host lists of a single region, grouped by role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegionHosts {
    #[serde(default)]
    pub region: String,
    /// Cache lifetime in seconds. Informational; the in-process cache keeps
    /// entries for the process lifetime.
    #[serde(default)]
    pub ttl: i64,
    #[serde(default)]
    pub up: UpHosts,
    #[serde(default)]
    pub io: HostList,
    #[serde(default)]
    pub io_src: HostList,
    #[serde(default)]
    pub api: HostList,
    #[serde(default)]
    pub rs: HostList,
    #[serde(default)]
    pub rsf: HostList,
    #[serde(default)]
    pub uc: HostList,
}

/// Upload hosts split into accelerated and source-site tiers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpHosts {
    #[serde(default)]
    pub acc: HostList,
    #[serde(default)]
    pub src: HostList,
}

/// An ordered host list: primary domains before backups.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostList {
    #[serde(default)]
    pub main: Vec<String>,
    #[serde(default)]
    pub backup: Vec<String>,
}

impl HostList {
    /// All domains, primaries first.
    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.main
            .iter()
            .chain(self.backup.iter())
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.main.is_empty() && self.backup.is_empty()
    }
}
