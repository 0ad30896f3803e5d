//! In-memory block region
//!
//! The engine mutates a flat `block_count * block_size` buffer and the
//! persistence layer writes it out wholesale on commit. Writes always
//! cover whole blocks, zero-filling the tail, so bytes from a previous
//! owner of a block are never readable through a live file.

use crate::core::alloc::Extent;
use crate::core::config::Geometry;
use crate::core::error::{FsError, Result};

#[derive(Debug, Clone)]
pub struct BlockStore {
    geometry: Geometry,
    data: Vec<u8>,
}

impl BlockStore {
    /// A zeroed region.
    pub fn new(geometry: Geometry) -> Self {
        BlockStore {
            geometry,
            data: vec![0; geometry.device_bytes() as usize],
        }
    }

    /// Rebuild a region from persisted bytes. Short input is
    /// zero-extended (a truncated image reads as zeros past its end)
    /// and oversized input is truncated to the region.
    pub fn from_bytes(geometry: Geometry, bytes: &[u8]) -> Self {
        let mut data = vec![0; geometry.device_bytes() as usize];
        let n = bytes.len().min(data.len());
        data[..n].copy_from_slice(&bytes[..n]);
        BlockStore { geometry, data }
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn check(&self, extent: Extent) -> Result<()> {
        let end = extent.start.checked_add(extent.len);
        match end {
            Some(e) if e <= self.geometry.block_count => Ok(()),
            _ => Err(FsError::InvalidRange {
                start: extent.start,
                len: extent.len,
                block_count: self.geometry.block_count,
            }),
        }
    }

    /// Read the leading `size` bytes of an extent.
    pub fn read_range(&self, extent: Extent, size: u64) -> Result<&[u8]> {
        self.check(extent)?;
        if size > extent.len * self.geometry.block_size as u64 {
            return Err(FsError::InvalidRange {
                start: extent.start,
                len: extent.len,
                block_count: self.geometry.block_count,
            });
        }
        let offset = (extent.start * self.geometry.block_size as u64) as usize;
        Ok(&self.data[offset..offset + size as usize])
    }

    /// Write `content` into an extent, zero-filling the rest of it.
    pub fn write_range(&mut self, extent: Extent, content: &[u8]) -> Result<()> {
        self.check(extent)?;
        let capacity = extent.len * self.geometry.block_size as u64;
        if content.len() as u64 > capacity {
            return Err(FsError::InvalidRange {
                start: extent.start,
                len: extent.len,
                block_count: self.geometry.block_count,
            });
        }
        let offset = (extent.start * self.geometry.block_size as u64) as usize;
        let slot = &mut self.data[offset..offset + capacity as usize];
        slot[..content.len()].copy_from_slice(content);
        slot[content.len()..].fill(0);
        Ok(())
    }

    /// Move `blocks` whole blocks from `src` to `dst`. Ranges may
    /// overlap; the compactor only ever moves content toward lower
    /// addresses.
    pub fn copy_blocks(&mut self, src: u64, dst: u64, blocks: u64) -> Result<()> {
        self.check(Extent::new(src, blocks))?;
        self.check(Extent::new(dst, blocks))?;
        let bs = self.geometry.block_size as u64;
        let src_off = (src * bs) as usize;
        let dst_off = (dst * bs) as usize;
        let len = (blocks * bs) as usize;
        self.data.copy_within(src_off..src_off + len, dst_off);
        Ok(())
    }

    /// The whole region, for the persistence layer.
    pub fn region(&self) -> &[u8] {
        &self.data
    }
}
