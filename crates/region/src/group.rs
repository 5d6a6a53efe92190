//! Prioritized region collection.

use crate::Region;

/// An ordered sequence of regions tried front to back. The cursor only
/// moves forward; once a region is abandoned the group never returns to it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionGroup {
    regions: Vec<Region>,
    cursor: usize,
}

impl RegionGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a group from regions in priority order.
    pub fn from_regions(regions: Vec<Region>) -> Self {
        Self { regions, cursor: 0 }
    }

    /// Appends a region at the lowest priority.
    pub fn add(&mut self, region: Region) {
        self.regions.push(region);
    }

    /// The region the cursor points at, if any remain.
    pub fn current(&self) -> Option<&Region> {
        self.regions.get(self.cursor)
    }

    /// Index of the current region within the original order.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Moves to the next region. Returns `false` when the group is
    /// exhausted; the cursor never wraps.
    pub fn advance(&mut self) -> bool {
        if self.cursor + 1 < self.regions.len() {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    /// A group is valid when it has regions and every one of them is
    /// individually usable.
    pub fn is_valid(&self) -> bool {
        !self.regions.is_empty() && self.regions.iter().all(Region::is_valid)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
