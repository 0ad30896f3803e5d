//! Engine operations
//!
//! An `Engine` is the complete in-memory state of a mounted image:
//! directory, free list, and block region. The dispatcher performs
//! exactly one operation per invocation and then persists the whole
//! state, so nothing here touches the disk.

use crate::core::alloc::{Extent, FreeList};
use crate::core::blocks::BlockStore;
use crate::core::config::Geometry;
use crate::core::directory::{validate_name, Directory, FileEntry};
use crate::core::error::{FsError, Result};

pub struct Engine {
    geometry: Geometry,
    directory: Directory,
    free: FreeList,
    blocks: BlockStore,
}

impl Engine {
    /// A freshly formatted engine: empty directory, fully free region.
    pub fn new(geometry: Geometry) -> Self {
        Engine {
            geometry,
            directory: Directory::new(),
            free: FreeList::new(geometry.block_count),
            blocks: BlockStore::new(geometry),
        }
    }

    /// Reassemble an engine from decoded image parts. The caller is
    /// expected to run `validate` before trusting the result.
    pub fn from_parts(
        geometry: Geometry,
        directory: Directory,
        free: FreeList,
        blocks: BlockStore,
    ) -> Self {
        Engine {
            geometry,
            directory,
            free,
            blocks,
        }
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn free(&self) -> &FreeList {
        &self.free
    }

    pub fn blocks(&self) -> &BlockStore {
        &self.blocks
    }

    /// Create a file. Fails on a duplicate or invalid name, or when no
    /// contiguous run can hold the content. Returns the start block.
    pub fn create(&mut self, name: &str, content: &[u8]) -> Result<u64> {
        validate_name(name)?;
        if self.directory.contains(name) {
            return Err(FsError::DuplicateName(name.to_string()));
        }

        let needed = self.geometry.blocks_for(content.len() as u64);
        let extent = self.free.allocate(needed)?;
        self.blocks.write_range(extent, content)?;

        self.directory.insert(FileEntry {
            name: name.to_string(),
            start: extent.start,
            blocks: extent.len,
            size: content.len() as u64,
        })?;

        Ok(extent.start)
    }

    /// Exact stored content of a file.
    pub fn read(&self, name: &str) -> Result<&[u8]> {
        let entry = self.directory.lookup(name)?;
        self.blocks.read_range(entry.range(), entry.size)
    }

    /// Replace a file's content.
    ///
    /// Content that still fits the current allocation is overwritten in
    /// place and any now-unused trailing blocks are released at once.
    /// Content that has outgrown it gets a fresh first-fit range, which
    /// may sit elsewhere; the old range is released first so it can be
    /// part of the new one. Either way the directory entry is rewritten
    /// in place and the listing order never changes.
    ///
    /// On failure the in-memory state is abandoned without a commit, so
    /// the persisted image keeps the previous content.
    pub fn update(&mut self, name: &str, content: &[u8]) -> Result<()> {
        let (old_range, _) = {
            let entry = self.directory.lookup(name)?;
            (entry.range(), entry.size)
        };

        let size = content.len() as u64;
        let needed = self.geometry.blocks_for(size);

        let target = if needed <= old_range.len {
            let kept = Extent::new(old_range.start, needed);
            let trailing = Extent::new(old_range.start + needed, old_range.len - needed);
            self.free.release(trailing)?;
            kept
        } else {
            self.free.release(old_range)?;
            self.free.allocate(needed)?
        };

        self.blocks.write_range(target, content)?;

        let entry = self.directory.lookup_mut(name)?;
        entry.start = if target.len == 0 { 0 } else { target.start };
        entry.blocks = target.len;
        entry.size = size;

        Ok(())
    }

    /// Remove a file and return its blocks to the free list.
    pub fn delete(&mut self, name: &str) -> Result<()> {
        let entry = self.directory.remove(name)?;
        self.free.release(entry.range())?;
        Ok(())
    }

    /// Entries in insertion order.
    pub fn list(&self) -> &[FileEntry] {
        self.directory.entries()
    }

    /// Pack live files back-to-back from block 0, in directory order.
    ///
    /// Contents are snapshotted before any move: packing in directory
    /// order can relocate a file into blocks still owned by a
    /// not-yet-moved neighbour. Names, sizes, contents, and listing
    /// order are unchanged; the free list collapses to one trailing
    /// extent. Already-compact images come out placed identically.
    pub fn compact(&mut self) -> Result<()> {
        let mut contents: Vec<Vec<u8>> = Vec::with_capacity(self.directory.len());
        for entry in self.directory.entries() {
            contents.push(self.blocks.read_range(entry.range(), entry.size)?.to_vec());
        }

        let mut cursor = 0u64;
        for (entry, content) in self.directory.entries_mut().iter_mut().zip(&contents) {
            if entry.blocks == 0 {
                entry.start = 0;
                continue;
            }
            let target = Extent::new(cursor, entry.blocks);
            self.blocks.write_range(target, content)?;
            entry.start = cursor;
            cursor += entry.blocks;
        }

        self.free = FreeList::rebuild(self.geometry.block_count, &self.directory.live_ranges())?;
        Ok(())
    }

    /// Check every structural invariant: entry shape, range bounds,
    /// disjointness, and that the free list is the exact complement of
    /// the live ranges.
    pub fn validate(&self) -> Result<()> {
        let block_count = self.geometry.block_count;

        for entry in self.directory.entries() {
            validate_name(&entry.name)?;

            if entry.blocks != self.geometry.blocks_for(entry.size) {
                return Err(FsError::Corrupted(format!(
                    "entry {:?}: {} blocks cannot hold {} bytes exactly",
                    entry.name, entry.blocks, entry.size
                )));
            }
            if entry.blocks == 0 && entry.start != 0 {
                return Err(FsError::Corrupted(format!(
                    "entry {:?}: empty file with nonzero start {}",
                    entry.name, entry.start
                )));
            }
            let end = entry.start.checked_add(entry.blocks);
            if !matches!(end, Some(e) if e <= block_count) {
                return Err(FsError::InvalidRange {
                    start: entry.start,
                    len: entry.blocks,
                    block_count,
                });
            }
        }

        // Rebuilding the complement both checks disjointness and gives
        // the expected free extents in one pass.
        let expected = FreeList::rebuild(block_count, &self.directory.live_ranges())
            .map_err(|_| FsError::Corrupted("live file ranges overlap".into()))?;

        let got: Vec<Extent> = self.free.extents().copied().collect();
        let want: Vec<Extent> = expected.extents().copied().collect();
        if got != want || self.free.block_count() != block_count {
            return Err(FsError::Corrupted(
                "free list does not complement live ranges".into(),
            ));
        }

        Ok(())
    }
}
