//! File directory
//!
//! Name to entry mapping with insertion order preserved, because
//! listings report files in the order they were created. Lookups are a
//! linear scan; directories here are small enough that a side index
//! would buy nothing.

use crate::core::alloc::Extent;
use crate::core::error::{FsError, Result};
use serde::{Deserialize, Serialize};

/// Bytes the listing format uses as delimiters; a name containing one
/// could not be encoded back out.
const FORBIDDEN: [char; 4] = [',', ';', '\n', '\r'];

/// Longest accepted file name in bytes.
pub const MAX_NAME_BYTES: usize = 255;

/// Validate a file name: non-empty, bounded, and free of delimiter
/// characters.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(FsError::InvalidName("name is empty".into()));
    }
    if name.len() > MAX_NAME_BYTES {
        return Err(FsError::InvalidName(format!(
            "name is {} bytes, maximum is {}",
            name.len(),
            MAX_NAME_BYTES
        )));
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN.contains(c)) {
        return Err(FsError::InvalidName(format!(
            "name contains forbidden character {:?}",
            c
        )));
    }
    Ok(())
}

/// Directory record for one live file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// File name, unique within the directory
    pub name: String,

    /// First block of the file's contiguous range
    pub start: u64,

    /// Number of blocks in the range (0 for empty files)
    pub blocks: u64,

    /// Content length in bytes
    pub size: u64,
}

impl FileEntry {
    /// The block range owned by this entry.
    pub fn range(&self) -> Extent {
        Extent::new(self.start, self.blocks)
    }
}

/// Insertion-ordered set of file entries with unique names
#[derive(Debug, Clone, Default)]
pub struct Directory {
    entries: Vec<FileEntry>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry. Fails on an invalid or duplicate name.
    pub fn insert(&mut self, entry: FileEntry) -> Result<()> {
        validate_name(&entry.name)?;
        if self.contains(&entry.name) {
            return Err(FsError::DuplicateName(entry.name));
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    pub fn lookup(&self, name: &str) -> Result<&FileEntry> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| FsError::NotFound(name.to_string()))
    }

    /// Mutable lookup; used by `update`, which rewrites an entry in
    /// place so the listing order never changes.
    pub fn lookup_mut(&mut self, name: &str) -> Result<&mut FileEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.name == name)
            .ok_or_else(|| FsError::NotFound(name.to_string()))
    }

    /// Remove and return an entry by name.
    pub fn remove(&mut self, name: &str) -> Result<FileEntry> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| FsError::NotFound(name.to_string()))?;
        Ok(self.entries.remove(idx))
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    /// Mutable view for the compactor, which reassigns start blocks
    /// without touching names, sizes, or order.
    pub fn entries_mut(&mut self) -> &mut [FileEntry] {
        &mut self.entries
    }

    /// Block ranges of all live entries, in directory order.
    pub fn live_ranges(&self) -> Vec<Extent> {
        self.entries.iter().map(|e| e.range()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
