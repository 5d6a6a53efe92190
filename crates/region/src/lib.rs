//! Region and host resolution.
//!
//! A [`Region`] holds ordered host lists per role. Regions compose into a
//! [`RegionGroup`] tried in priority order, and the whole thing sits behind
//! a [`RegionRouter`]: the single shared, mutex-guarded piece of failover
//! state (current region cursor, in-region host cursor, host freeze table)
//! that upload sessions consult for hosts and notify about bad ones.
//!
//! Failover is two-level by policy: rotate to another host inside the
//! current region first, and only cross to the next region when the current
//! one is out of alternates — cross-region moves change data locality and
//! latency, so they are the last resort.

mod discovery;
mod freeze;
mod group;
mod region;
mod router;

pub use discovery::{AutoRegion, DiscoveryClient, DiscoveryConfig};
pub use freeze::{DEFAULT_FREEZE, HostFreezer};
pub use group::RegionGroup;
pub use region::{HostRole, Region, RegionBuilder, ReqInfo};
pub use router::{RegionRouter, RegionSource, UpHost};

/// Errors from resolution and discovery.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegionError {
    /// Every candidate is frozen or none was ever configured, in every
    /// remaining region.
    #[error("no upload host available")]
    NoHostAvailable,

    /// The directory service could not be queried or returned an unusable
    /// topology. Hard error; never silently retried.
    #[error("region discovery failed: {0}")]
    Discovery(String),

    #[error("invalid region configuration: {0}")]
    InvalidConfig(String),
}
