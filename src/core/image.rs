//! Image encoding and best-effort decoding
//!
//! An image is one flat byte vector: a fixed 64-byte superblock, a
//! CRC-protected metadata section (directory entries, then free
//! extents, each count-prefixed and bincode-encoded), and the raw block
//! region. `decode` never fails hard: anything that does not check out
//! downgrades to a salvage scan that keeps every entry it can still
//! prove sound and reports what happened.

use crate::core::alloc::{Extent, FreeList};
use crate::core::blocks::BlockStore;
use crate::core::config::Geometry;
use crate::core::directory::{validate_name, Directory, FileEntry};
use crate::core::engine::Engine;
use crate::core::error::{FsError, Result};
use crate::core::superblock::{ImageState, Superblock, SUPERBLOCK_LEN};
use bincode::Options;
use std::io::{Cursor, Read};

/// Upper bound on one encoded metadata record. A record is a file
/// entry (bounded name plus three integers) or a free extent; anything
/// claiming to be bigger is a torn or forged length prefix.
const MAX_RECORD_BYTES: u64 = 4096;

fn codec() -> impl Options {
    bincode::options()
        .with_fixint_encoding()
        .with_limit(MAX_RECORD_BYTES)
}

/// Why a load had to recover, in the order the checks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryCause {
    /// Superblock magic, version, or geometry did not check out
    HeaderMismatch,
    /// The file ends before the superblock, metadata, or block region does
    TruncatedImage,
    /// Metadata section present but its CRC32 does not match
    ChecksumMismatch,
    /// The commit-in-progress marker was set (deliberate crash, or a real one)
    UncleanShutdown,
    /// CRC-valid metadata that violates structural invariants
    InconsistentAllocation,
}

impl RecoveryCause {
    /// Human-readable cause, with spaces (the wire layer underscores it).
    pub fn message(&self) -> &'static str {
        match self {
            RecoveryCause::HeaderMismatch => "header mismatch",
            RecoveryCause::TruncatedImage => "truncated write",
            RecoveryCause::ChecksumMismatch => "metadata checksum mismatch",
            RecoveryCause::UncleanShutdown => "unclean shutdown detected",
            RecoveryCause::InconsistentAllocation => "allocation table inconsistent",
        }
    }
}

/// What a recovering load did. Ephemeral: surfaced on the next `list`
/// and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    pub cause: RecoveryCause,
    /// Entries that survived the salvage scan
    pub salvaged: usize,
    /// Entries parsed but rejected as unsound
    pub dropped: usize,
}

/// Serialize the complete image for the given engine state.
pub fn encode(engine: &Engine, generation: u64, state: ImageState) -> Result<Vec<u8>> {
    let mut meta = Vec::new();

    let entries = engine.directory().entries();
    meta.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for entry in entries {
        codec().serialize_into(&mut meta, entry)?;
    }

    let extents: Vec<Extent> = engine.free().extents().copied().collect();
    meta.extend_from_slice(&(extents.len() as u32).to_le_bytes());
    for extent in &extents {
        codec().serialize_into(&mut meta, extent)?;
    }

    if meta.len() as u64 > u32::MAX as u64 {
        return Err(FsError::Corrupted(
            "metadata section exceeds format limit".into(),
        ));
    }

    let mut sb = Superblock::new(engine.geometry());
    sb.state = state;
    sb.generation = generation;
    sb.meta_len = meta.len() as u32;
    sb.meta_crc = crc32fast::hash(&meta);

    let region = engine.blocks().region();
    let mut out = Vec::with_capacity(SUPERBLOCK_LEN + meta.len() + region.len());
    out.extend_from_slice(&sb.to_bytes());
    out.extend_from_slice(&meta);
    out.extend_from_slice(region);

    Ok(out)
}

/// Deserialize an image, recovering when it does not check out.
///
/// Returns the engine plus a report when recovery ran. A rejected
/// header falls back to `fallback` geometry and an empty state, since
/// nothing in the image can be trusted to size a buffer.
pub fn decode(bytes: &[u8], fallback: Geometry) -> (Engine, u64, Option<RecoveryReport>) {
    let sb = match Superblock::from_bytes(bytes) {
        Ok(sb) => sb,
        Err(_) => {
            return (
                Engine::new(fallback),
                0,
                Some(RecoveryReport {
                    cause: RecoveryCause::TruncatedImage,
                    salvaged: 0,
                    dropped: 0,
                }),
            )
        }
    };

    if sb.validate().is_err() {
        return (
            Engine::new(fallback),
            0,
            Some(RecoveryReport {
                cause: RecoveryCause::HeaderMismatch,
                salvaged: 0,
                dropped: 0,
            }),
        );
    }

    let geometry = sb.geometry();
    let len = bytes.len() as u64;
    let meta_end = SUPERBLOCK_LEN as u64 + sb.meta_len as u64;

    // First failing check names the cause; the crash simulator both
    // sets the marker and truncates, and the marker wins.
    let cause = if sb.state == ImageState::Committing {
        Some(RecoveryCause::UncleanShutdown)
    } else if len < meta_end {
        Some(RecoveryCause::TruncatedImage)
    } else if crc32fast::hash(&bytes[SUPERBLOCK_LEN..meta_end as usize]) != sb.meta_crc {
        Some(RecoveryCause::ChecksumMismatch)
    } else if len - meta_end < geometry.device_bytes() {
        Some(RecoveryCause::TruncatedImage)
    } else {
        None
    };

    match cause {
        Some(cause) => salvage(bytes, &sb, cause),
        None => match decode_strict(bytes, &sb) {
            Ok(engine) => (engine, sb.generation, None),
            Err(e) => {
                tracing::warn!("image metadata failed strict validation: {e}");
                salvage(bytes, &sb, RecoveryCause::InconsistentAllocation)
            }
        },
    }
}

/// Strict parse of a fully present, CRC-clean image.
fn decode_strict(bytes: &[u8], sb: &Superblock) -> Result<Engine> {
    let geometry = sb.geometry();
    let meta_end = SUPERBLOCK_LEN + sb.meta_len as usize;
    let mut cursor = Cursor::new(&bytes[SUPERBLOCK_LEN..meta_end]);

    let entry_count = read_count(&mut cursor)?;
    let mut directory = Directory::new();
    for _ in 0..entry_count {
        let entry: FileEntry = codec().deserialize_from(&mut cursor)?;
        directory.insert(entry)?;
    }

    let extent_count = read_count(&mut cursor)?;
    let mut extents = Vec::with_capacity(extent_count.min(4096) as usize);
    for _ in 0..extent_count {
        extents.push(codec().deserialize_from::<_, Extent>(&mut cursor)?);
    }

    if cursor.position() != sb.meta_len as u64 {
        return Err(FsError::Corrupted(
            "trailing bytes in metadata section".into(),
        ));
    }

    let free = FreeList::from_extents(geometry.block_count, &extents)?;
    let blocks = BlockStore::from_bytes(geometry, &bytes[meta_end..]);

    let engine = Engine::from_parts(geometry, directory, free, blocks);
    engine.validate()?;
    Ok(engine)
}

fn read_count(cursor: &mut Cursor<&[u8]>) -> Result<u32> {
    let mut buf = [0u8; 4];
    cursor
        .read_exact(&mut buf)
        .map_err(|_| FsError::Corrupted("metadata section shorter than its counts".into()))?;
    Ok(u32::from_le_bytes(buf))
}

/// Best-effort scan of a damaged image.
///
/// Decodes directory records one at a time, stopping at the first
/// malformed one, and keeps each entry only if it is provably sound:
/// valid unseen name, block count matching its size, in-bounds range,
/// no overlap with an already-kept entry, and every content byte
/// actually present in the file. The persisted free list is distrusted
/// wholesale and rebuilt as the complement of the kept ranges; missing
/// block bytes read as zeros.
fn salvage(
    bytes: &[u8],
    sb: &Superblock,
    cause: RecoveryCause,
) -> (Engine, u64, Option<RecoveryReport>) {
    let geometry = sb.geometry();
    let len = bytes.len() as u64;
    let meta_start = SUPERBLOCK_LEN as u64;
    let meta_end = (meta_start + sb.meta_len as u64).min(len);
    let meta = &bytes[meta_start as usize..meta_end as usize];

    // Where the block region should begin, and how much of it is there.
    let data_start = meta_start + sb.meta_len as u64;
    let data_avail = len.saturating_sub(data_start);

    let mut cursor = Cursor::new(meta);
    let mut count_buf = [0u8; 4];
    let entry_count = match cursor.read_exact(&mut count_buf) {
        Ok(()) => u32::from_le_bytes(count_buf),
        Err(_) => 0,
    };

    let mut accepted: Vec<FileEntry> = Vec::new();
    let mut dropped = 0usize;

    for _ in 0..entry_count {
        let entry: FileEntry = match codec().deserialize_from(&mut cursor) {
            Ok(entry) => entry,
            Err(_) => break,
        };
        if entry_is_sound(&entry, geometry, data_avail, &accepted) {
            accepted.push(entry);
        } else {
            dropped += 1;
        }
    }

    let salvaged = accepted.len();
    let report = Some(RecoveryReport {
        cause,
        salvaged,
        dropped,
    });

    let engine = match rebuild_engine(bytes, geometry, data_start, accepted) {
        Ok(engine) => engine,
        // Unreachable with sound-checked entries; fall back to empty
        // rather than surfacing an error from the recovery path.
        Err(_) => Engine::new(geometry),
    };

    (engine, sb.generation, report)
}

fn rebuild_engine(
    bytes: &[u8],
    geometry: Geometry,
    data_start: u64,
    accepted: Vec<FileEntry>,
) -> Result<Engine> {
    let mut directory = Directory::new();
    let ranges: Vec<Extent> = accepted.iter().map(|e| e.range()).collect();
    for entry in accepted {
        directory.insert(entry)?;
    }
    let free = FreeList::rebuild(geometry.block_count, &ranges)?;

    let data_from = (data_start as usize).min(bytes.len());
    let blocks = BlockStore::from_bytes(geometry, &bytes[data_from..]);

    Ok(Engine::from_parts(geometry, directory, free, blocks))
}

fn entry_is_sound(
    entry: &FileEntry,
    geometry: Geometry,
    data_avail: u64,
    accepted: &[FileEntry],
) -> bool {
    if validate_name(&entry.name).is_err() {
        return false;
    }
    if accepted.iter().any(|e| e.name == entry.name) {
        return false;
    }
    if entry.blocks != geometry.blocks_for(entry.size) {
        return false;
    }
    if entry.blocks == 0 {
        return entry.start == 0;
    }

    let end = match entry.start.checked_add(entry.blocks) {
        Some(end) => end,
        None => return false,
    };
    if end > geometry.block_count {
        return false;
    }

    // Every content byte must physically exist in the file; a range
    // that runs past the truncation point cannot be fully read.
    let span_end = entry.start * geometry.block_size as u64 + entry.size;
    if span_end > data_avail {
        return false;
    }

    let range = entry.range();
    !accepted
        .iter()
        .filter(|e| e.blocks > 0)
        .any(|e| e.range().start < range.end() && range.start < e.range().end())
}
