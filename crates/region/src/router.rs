//! Shared failover state: which region, which host, what is frozen.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::{AutoRegion, DEFAULT_FREEZE, HostFreezer, Region, RegionError, RegionGroup};

/// Where a router's regions come from.
#[derive(Debug, Clone)]
pub enum RegionSource {
    /// One statically configured region.
    Single(Region),
    /// A prioritized fallback group.
    Group(RegionGroup),
    /// Resolved on first use from the directory service.
    Auto(AutoRegion),
}

/// A resolved upload endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct UpHost {
    /// scheme + domain, ready to prefix a protocol path.
    pub url: String,
    pub domain: String,
    /// Region the host belongs to.
    pub region: String,
}

/// Thread-safe region/host selection for upload traffic.
///
/// All mutation (region cursor, in-region host cursor, freeze table) happens
/// under one writer lock; callers never see a half-switched state. Sessions
/// that need isolation from each other's failover take [`isolated`]
/// (deep) copies instead of sharing one router.
///
/// [`isolated`]: RegionRouter::isolated
pub struct RegionRouter {
    inner: RwLock<RouterInner>,
}

#[derive(Debug, Clone)]
struct RouterInner {
    source: RegionSource,
    /// Materialized failover state; `None` until an auto source resolves.
    group: Option<RegionGroup>,
    /// Index into the current region's upload-host order.
    host_cursor: usize,
    freezer: HostFreezer,
    use_https: bool,
    freeze_duration: Duration,
}

impl RegionRouter {
    /// Routes within a single static region.
    pub fn single(region: Region) -> Self {
        Self::new(RegionSource::Single(region))
    }

    /// Routes across a prioritized region group.
    pub fn group(group: RegionGroup) -> Self {
        Self::new(RegionSource::Group(group))
    }

    /// Routes wherever the directory service says the bucket lives.
    pub fn auto(auto: AutoRegion) -> Self {
        Self::new(RegionSource::Auto(auto))
    }

    pub fn new(source: RegionSource) -> Self {
        let group = match &source {
            RegionSource::Single(region) => {
                Some(RegionGroup::from_regions(vec![region.clone()]))
            }
            RegionSource::Group(group) => Some(group.clone()),
            RegionSource::Auto(_) => None,
        };
        Self {
            inner: RwLock::new(RouterInner {
                source,
                group,
                host_cursor: 0,
                freezer: HostFreezer::new(),
                use_https: true,
                freeze_duration: DEFAULT_FREEZE,
            }),
        }
    }

    /// Switches generated URLs to plain HTTP.
    pub fn use_http(self) -> Self {
        self.inner.write().unwrap().use_https = false;
        self
    }

    /// Overrides how long [`mark_bad`](Self::mark_bad) freezes a host.
    pub fn with_freeze_duration(self, freeze: Duration) -> Self {
        self.inner.write().unwrap().freeze_duration = freeze;
        self
    }

    /// Resolves an auto source. Static sources are ready from construction;
    /// calling this more than once is free.
    pub async fn ensure_ready(&self) -> Result<(), RegionError> {
        if self.inner.read().unwrap().group.is_some() {
            return Ok(());
        }

        let auto = {
            let inner = self.inner.read().unwrap();
            match &inner.source {
                RegionSource::Auto(auto) => auto.clone(),
                // group is always Some for static sources
                _ => return Ok(()),
            }
        };

        let regions = auto.resolve().await?;
        info!(regions = regions.len(), "region topology resolved");

        let mut inner = self.inner.write().unwrap();
        if inner.group.is_none() {
            inner.group = Some(RegionGroup::from_regions(regions));
        }
        Ok(())
    }

    /// Whether the router has at least one usable region.
    pub fn is_valid(&self) -> bool {
        self.inner
            .read()
            .unwrap()
            .group
            .as_ref()
            .is_some_and(RegionGroup::is_valid)
    }

    /// Name of the region currently being routed to.
    pub fn current_region(&self) -> Option<String> {
        let inner = self.inner.read().unwrap();
        inner
            .group
            .as_ref()
            .and_then(RegionGroup::current)
            .map(|r| r.name().to_string())
    }

    /// Picks the upload host for the next attempt: the first unfrozen
    /// candidate at or after the in-region cursor, skipping `exclude` so a
    /// caller can demand a host distinct from one already tried. Advances to
    /// the next region when the current one has nothing left to offer.
    pub fn up_host(&self, exclude: Option<&str>) -> Result<UpHost, RegionError> {
        let mut inner = self.inner.write().unwrap();
        let now = Instant::now();
        let scheme = if inner.use_https { "https" } else { "http" };

        loop {
            let (candidates, region_name) = {
                let Some(region) = inner.group.as_ref().and_then(RegionGroup::current) else {
                    return Err(RegionError::NoHostAvailable);
                };
                (region.up_hosts(), region.name().to_string())
            };

            let start = inner.host_cursor.min(candidates.len());
            for domain in candidates.iter().skip(start) {
                if inner.freezer.is_frozen_at(domain, now) {
                    continue;
                }
                if exclude.is_some_and(|e| e == domain.as_str()) {
                    continue;
                }
                return Ok(UpHost {
                    url: format!("{scheme}://{domain}"),
                    domain: domain.clone(),
                    region: region_name,
                });
            }

            let advanced = inner.group.as_mut().is_some_and(RegionGroup::advance);
            if !advanced {
                return Err(RegionError::NoHostAvailable);
            }
            inner.host_cursor = 0;
            debug!(region = ?self_current(&inner), "current region exhausted, advancing");
        }
    }

    /// Reacts to a failed host: rotates to the next in-region alternate,
    /// crossing to the next region only when the current one has none. The
    /// failed host is frozen only when somewhere else exists to go — with a
    /// single configured host the caller keeps retrying it in place.
    /// Returns `false` when no alternate was found.
    pub fn switch_host(&self, failed: &str) -> bool {
        let mut inner = self.inner.write().unwrap();
        let now = Instant::now();
        let freeze = inner.freeze_duration;

        let (candidates, region_name) = {
            let Some(region) = inner.group.as_ref().and_then(RegionGroup::current) else {
                return false;
            };
            (region.up_hosts(), region.name().to_string())
        };

        // In-region rotation first.
        let next = candidates
            .iter()
            .enumerate()
            .skip(inner.host_cursor)
            .find(|(_, domain)| {
                domain.as_str() != failed && !inner.freezer.is_frozen_at(domain, now)
            });
        if let Some((index, domain)) = next {
            debug!(failed, next = %domain, region = %region_name, "rotating host in region");
            inner.freezer.mark_at(failed, freeze, now);
            inner.host_cursor = index;
            return true;
        }

        // Out of in-region alternates; cross regions.
        let advanced = inner.group.as_mut().is_some_and(RegionGroup::advance);
        if advanced {
            inner.freezer.mark_at(failed, freeze, now);
            inner.host_cursor = 0;
            info!(failed, from = %region_name, "failing over to next region");
        }
        advanced
    }

    /// Freezes a host for the configured duration without touching cursors.
    pub fn mark_bad(&self, domain: &str) {
        let mut inner = self.inner.write().unwrap();
        let freeze = inner.freeze_duration;
        inner.freezer.mark_at(domain, freeze, Instant::now());
    }

    /// Freezes a host for an explicit duration.
    pub fn mark_bad_for(&self, domain: &str, freeze: Duration) {
        let mut inner = self.inner.write().unwrap();
        inner.freezer.mark_at(domain, freeze, Instant::now());
    }

    /// Deep copy with independent cursors and freeze table, so concurrent
    /// sessions cannot drag each other across regions. An auto source keeps
    /// sharing the discovery cache (topology data, not failover state).
    pub fn isolated(&self) -> RegionRouter {
        RegionRouter {
            inner: RwLock::new(self.inner.read().unwrap().clone()),
        }
    }
}

fn self_current(inner: &RouterInner) -> Option<&str> {
    inner
        .group
        .as_ref()
        .and_then(RegionGroup::current)
        .map(Region::name)
}
