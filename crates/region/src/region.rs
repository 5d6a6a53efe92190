//! A single storage region and its per-role host lists.

use blocklift_protocol::RegionHosts;

/// What a host is used for. Upload traffic goes to `AccUp`/`SrcUp`; the
/// remaining roles serve read-back and management calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostRole {
    /// Source-site upload endpoints.
    SrcUp,
    /// Accelerated upload endpoints, preferred when present.
    AccUp,
    /// Download/IO endpoints.
    Io,
    /// Source-site IO endpoints.
    IoSrc,
    /// Management API.
    Api,
    /// Metadata service.
    Rs,
    /// Listing service.
    Rsf,
    /// Directory/config service.
    Uc,
}

/// Identifies the credential and bucket a resolution is for; auto-detected
/// topologies are keyed by it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReqInfo {
    pub access_key: String,
    pub bucket: String,
}

impl ReqInfo {
    pub fn new(access_key: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            bucket: bucket.into(),
        }
    }
}

/// One logical storage cluster. Host lists preserve caller-significant
/// order (primary before backup) and are immutable after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    name: String,
    src_up: Vec<String>,
    acc_up: Vec<String>,
    io: Vec<String>,
    io_src: Vec<String>,
    api: Vec<String>,
    rs: Vec<String>,
    rsf: Vec<String>,
    uc: Vec<String>,
}

impl Region {
    /// Starts building a region with the given identifier.
    pub fn builder(name: impl Into<String>) -> RegionBuilder {
        RegionBuilder {
            region: Region {
                name: name.into(),
                src_up: Vec::new(),
                acc_up: Vec::new(),
                io: Vec::new(),
                io_src: Vec::new(),
                api: Vec::new(),
                rs: Vec::new(),
                rsf: Vec::new(),
                uc: Vec::new(),
            },
        }
    }

    /// Builds a region from one directory-service topology entry.
    pub fn from_query(hosts: &RegionHosts) -> Self {
        Self {
            name: hosts.region.clone(),
            acc_up: hosts.up.acc.domains().map(str::to_string).collect(),
            src_up: hosts.up.src.domains().map(str::to_string).collect(),
            io: hosts.io.domains().map(str::to_string).collect(),
            io_src: hosts.io_src.domains().map(str::to_string).collect(),
            api: hosts.api.domains().map(str::to_string).collect(),
            rs: hosts.rs.domains().map(str::to_string).collect(),
            rsf: hosts.rsf.domains().map(str::to_string).collect(),
            uc: hosts.uc.domains().map(str::to_string).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ordered hosts for a role.
    pub fn hosts(&self, role: HostRole) -> &[String] {
        match role {
            HostRole::SrcUp => &self.src_up,
            HostRole::AccUp => &self.acc_up,
            HostRole::Io => &self.io,
            HostRole::IoSrc => &self.io_src,
            HostRole::Api => &self.api,
            HostRole::Rs => &self.rs,
            HostRole::Rsf => &self.rsf,
            HostRole::Uc => &self.uc,
        }
    }

    /// Upload candidates in failover order: accelerated hosts first, then
    /// source-site hosts, duplicates removed with first occurrence winning.
    pub fn up_hosts(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(self.acc_up.len() + self.src_up.len());
        for domain in self.acc_up.iter().chain(self.src_up.iter()) {
            if !out.iter().any(|d| d == domain) {
                out.push(domain.clone());
            }
        }
        out
    }

    /// A region is usable when at least one role has a host configured.
    pub fn is_valid(&self) -> bool {
        [
            &self.src_up,
            &self.acc_up,
            &self.io,
            &self.io_src,
            &self.api,
            &self.rs,
            &self.rsf,
            &self.uc,
        ]
        .iter()
        .any(|list| !list.is_empty())
    }
}

/// Builder for static region definitions.
#[derive(Debug, Clone)]
pub struct RegionBuilder {
    region: Region,
}

impl RegionBuilder {
    pub fn src_up<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.region.src_up = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn acc_up<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.region.acc_up = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn io<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.region.io = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn io_src<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.region.io_src = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn api<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.region.api = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn rs<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.region.rs = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn rsf<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.region.rsf = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn uc<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.region.uc = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> Region {
        self.region
    }
}
