//! Free-space tracking for the block region
//!
//! Free space is tracked as extents (contiguous block ranges) indexed by
//! start block, with automatic coalescing on release. Allocation is
//! first-fit: the lowest-addressed free run that can hold the request
//! wins, and a request that no single run can hold fails even when the
//! total free count would suffice. Files always occupy one contiguous
//! range, so the allocator never hands out scattered blocks.

use crate::core::error::{FsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A contiguous range of blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extent {
    /// Starting block index
    pub start: u64,
    /// Number of contiguous blocks
    pub len: u64,
}

impl Extent {
    pub fn new(start: u64, len: u64) -> Self {
        Extent { start, len }
    }

    /// First block index past the end of the range.
    pub fn end(&self) -> u64 {
        self.start + self.len
    }

    /// Check if this extent contains a block index
    pub fn contains(&self, block: u64) -> bool {
        block >= self.start && block < self.end()
    }

    /// Check if this extent is adjacent to another (can be coalesced)
    pub fn is_adjacent(&self, other: &Extent) -> bool {
        self.end() == other.start || other.end() == self.start
    }

    /// Coalesce two adjacent extents
    pub fn coalesce(&self, other: &Extent) -> Option<Extent> {
        if !self.is_adjacent(other) {
            return None;
        }

        let start = self.start.min(other.start);
        let end = self.end().max(other.end());

        Some(Extent {
            start,
            len: end - start,
        })
    }
}

/// Free-extent tracker over a fixed-size block region
///
/// A `BTreeMap` keyed by start block keeps free extents sorted, which
/// gives first-fit allocation a single ascending scan and makes
/// neighbour lookup for coalescing cheap.
#[derive(Debug, Clone)]
pub struct FreeList {
    /// Free extents indexed by start block
    extents: BTreeMap<u64, Extent>,

    /// Total number of blocks tracked
    block_count: u64,

    /// Number of free blocks available
    free_blocks: u64,
}

impl FreeList {
    /// Create a free list covering an entirely free region.
    pub fn new(block_count: u64) -> Self {
        let mut extents = BTreeMap::new();

        if block_count > 0 {
            extents.insert(0, Extent::new(0, block_count));
        }

        FreeList {
            extents,
            block_count,
            free_blocks: block_count,
        }
    }

    /// Allocate a contiguous run of `num_blocks`.
    ///
    /// First-fit: scans free extents in ascending start order and takes
    /// the leading blocks of the first one large enough. Zero-block
    /// requests succeed with an empty extent at 0 and leave the list
    /// untouched.
    pub fn allocate(&mut self, num_blocks: u64) -> Result<Extent> {
        if num_blocks == 0 {
            return Ok(Extent::new(0, 0));
        }

        let fit = self
            .extents
            .values()
            .find(|extent| extent.len >= num_blocks)
            .copied();

        let extent = match fit {
            Some(e) => e,
            None => {
                return Err(FsError::OutOfSpace {
                    requested: num_blocks,
                    largest_free: self.largest_free(),
                })
            }
        };

        self.extents.remove(&extent.start);

        let allocated = Extent::new(extent.start, num_blocks);

        let remaining = extent.len - num_blocks;
        if remaining > 0 {
            let rest = Extent::new(extent.start + num_blocks, remaining);
            self.extents.insert(rest.start, rest);
        }

        self.free_blocks -= num_blocks;

        Ok(allocated)
    }

    /// Return a previously allocated range, coalescing with neighbours.
    ///
    /// Rejects ranges that fall outside the region or intersect blocks
    /// that are already free, so a double release cannot corrupt the
    /// accounting.
    pub fn release(&mut self, extent: Extent) -> Result<()> {
        if extent.len == 0 {
            return Ok(());
        }

        let end = extent.start.checked_add(extent.len);
        match end {
            Some(e) if e <= self.block_count => {}
            _ => {
                return Err(FsError::InvalidRange {
                    start: extent.start,
                    len: extent.len,
                    block_count: self.block_count,
                })
            }
        }

        // Any overlapping free extent must start before `extent.end()`,
        // and among those the last one is the only candidate once the
        // list is coalesced.
        if let Some((_, prev)) = self.extents.range(..extent.end()).next_back() {
            if prev.end() > extent.start {
                return Err(FsError::InvalidRange {
                    start: extent.start,
                    len: extent.len,
                    block_count: self.block_count,
                });
            }
        }

        self.free_blocks += extent.len;
        self.insert_and_coalesce(extent);

        Ok(())
    }

    /// Insert a free extent and coalesce with adjacent extents
    fn insert_and_coalesce(&mut self, mut extent: Extent) {
        let mut to_remove = Vec::new();

        if let Some((&prev_start, &prev_extent)) = self.extents.range(..extent.start).next_back() {
            if let Some(merged) = prev_extent.coalesce(&extent) {
                extent = merged;
                to_remove.push(prev_start);
            }
        }

        if let Some((&next_start, &next_extent)) = self.extents.range(extent.end()..).next() {
            if let Some(merged) = extent.coalesce(&next_extent) {
                extent = merged;
                to_remove.push(next_start);
            }
        }

        for key in to_remove {
            self.extents.remove(&key);
        }

        self.extents.insert(extent.start, extent);
    }

    /// Rebuild a free list as the exact complement of the given live
    /// ranges. Used after a salvage scan and by the compactor, where the
    /// persisted free list is not to be trusted.
    ///
    /// Zero-length ranges are ignored. Fails if any live range escapes
    /// the region or overlaps another.
    pub fn rebuild(block_count: u64, live: &[Extent]) -> Result<Self> {
        let mut ranges: Vec<Extent> = live.iter().filter(|e| e.len > 0).copied().collect();
        ranges.sort_by_key(|e| e.start);

        let mut extents = BTreeMap::new();
        let mut free_blocks = 0u64;
        let mut cursor = 0u64;

        for range in &ranges {
            let end = range.start.checked_add(range.len);
            let in_bounds = matches!(end, Some(e) if e <= block_count);
            if !in_bounds || range.start < cursor {
                return Err(FsError::InvalidRange {
                    start: range.start,
                    len: range.len,
                    block_count,
                });
            }
            if range.start > cursor {
                let gap = Extent::new(cursor, range.start - cursor);
                free_blocks += gap.len;
                extents.insert(gap.start, gap);
            }
            cursor = range.end();
        }

        if cursor < block_count {
            let gap = Extent::new(cursor, block_count - cursor);
            free_blocks += gap.len;
            extents.insert(gap.start, gap);
        }

        Ok(FreeList {
            extents,
            block_count,
            free_blocks,
        })
    }

    /// Reconstitute a free list from persisted extents.
    ///
    /// Validates bounds and disjointness the same way `release` does, so
    /// a tampered extent table surfaces as an error instead of silent
    /// double-ownership.
    pub fn from_extents(block_count: u64, extents: &[Extent]) -> Result<Self> {
        let mut list = FreeList {
            extents: BTreeMap::new(),
            block_count,
            free_blocks: 0,
        };

        for extent in extents {
            list.release(*extent)?;
        }

        Ok(list)
    }

    /// Check that a range is entirely free.
    pub fn is_free(&self, extent: Extent) -> bool {
        if extent.len == 0 {
            return true;
        }

        match self.extents.range(..=extent.start).next_back() {
            Some((_, e)) => e.contains(extent.start) && extent.end() <= e.end(),
            None => false,
        }
    }

    /// Free extents in ascending start order.
    pub fn extents(&self) -> impl Iterator<Item = &Extent> {
        self.extents.values()
    }

    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    pub fn free_blocks(&self) -> u64 {
        self.free_blocks
    }

    /// Length of the largest free run.
    pub fn largest_free(&self) -> u64 {
        self.extents.values().map(|e| e.len).max().unwrap_or(0)
    }

    /// Number of free extents (fragmentation indicator).
    pub fn extent_count(&self) -> usize {
        self.extents.len()
    }
}
