use crate::core::config::Geometry;
use crate::core::error::{FsError, Result};

pub const MAGIC: [u8; 8] = *b"VDSK\x00\x01\x00\x00";
pub const VERSION_MAJOR: u16 = 1;
pub const VERSION_MINOR: u16 = 0;

/// Fixed size of the on-disk superblock in bytes.
pub const SUPERBLOCK_LEN: usize = 64;

/// Commit state recorded in the superblock.
///
/// A committed image is always `Clean`. The crash simulator leaves the
/// image marked `Committing`, which the next load reports as an unclean
/// shutdown. Unknown byte values are treated as `Committing` so that a
/// scribbled state byte errs on the side of a salvage scan.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageState {
    Clean = 0,
    Committing = 1,
}

impl ImageState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Clean,
            _ => Self::Committing,
        }
    }
}

/// Image superblock (first 64 bytes of the file)
///
/// Carries the format magic and version, the commit state, the device
/// geometry, a monotonically increasing commit generation, and the length
/// and CRC32 of the metadata section that follows it.
#[derive(Debug, Clone, Copy)]
pub struct Superblock {
    /// Magic number: "VDSK\x00\x01\x00\x00"
    pub magic: [u8; 8],

    /// Format version (major)
    pub version_major: u16,

    /// Format version (minor)
    pub version_minor: u16,

    /// Commit state: clean, or torn mid-commit
    pub state: ImageState,

    /// Block size in bytes
    pub block_size: u32,

    /// Total number of blocks in the device region
    pub block_count: u64,

    /// Commit counter, incremented on every successful commit
    pub generation: u64,

    /// Length in bytes of the metadata section
    pub meta_len: u32,

    /// CRC32 over the metadata section
    pub meta_crc: u32,

    /// Reserved for future extensions (20 bytes, zeroed)
    pub reserved: [u8; 20],
}

impl Superblock {
    /// Create a superblock for a clean image with the given geometry.
    pub fn new(geometry: Geometry) -> Self {
        Superblock {
            magic: MAGIC,
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
            state: ImageState::Clean,
            block_size: geometry.block_size,
            block_count: geometry.block_count,
            generation: 0,
            meta_len: 0,
            meta_crc: 0,
            reserved: [0; 20],
        }
    }

    pub fn geometry(&self) -> Geometry {
        Geometry {
            block_size: self.block_size,
            block_count: self.block_count,
        }
    }

    /// Validate magic, version, and geometry sanity.
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(FsError::Corrupted("bad magic number".into()));
        }

        if self.version_major != VERSION_MAJOR || self.version_minor != VERSION_MINOR {
            return Err(FsError::Corrupted(format!(
                "unsupported format version {}.{}",
                self.version_major, self.version_minor
            )));
        }

        // Bounds-check geometry before anyone sizes a buffer from it.
        self.geometry()
            .validate()
            .map_err(|e| FsError::Corrupted(format!("bad geometry: {e}")))?;

        Ok(())
    }

    /// Serialize to exactly `SUPERBLOCK_LEN` bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(SUPERBLOCK_LEN);

        bytes.extend_from_slice(&self.magic);
        bytes.extend_from_slice(&self.version_major.to_le_bytes());
        bytes.extend_from_slice(&self.version_minor.to_le_bytes());
        bytes.push(self.state as u8);
        bytes.extend_from_slice(&[0u8; 3]);
        bytes.extend_from_slice(&self.block_size.to_le_bytes());
        bytes.extend_from_slice(&self.block_count.to_le_bytes());
        bytes.extend_from_slice(&self.generation.to_le_bytes());
        bytes.extend_from_slice(&self.meta_len.to_le_bytes());
        bytes.extend_from_slice(&self.meta_crc.to_le_bytes());
        bytes.extend_from_slice(&self.reserved);

        debug_assert_eq!(bytes.len(), SUPERBLOCK_LEN);
        bytes
    }

    /// Deserialize from bytes. Fails only on short input; callers decide
    /// what a failed `validate()` means for them.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < SUPERBLOCK_LEN {
            return Err(FsError::Corrupted(format!(
                "superblock truncated: {} of {} bytes",
                bytes.len(),
                SUPERBLOCK_LEN
            )));
        }

        let mut magic = [0u8; 8];
        magic.copy_from_slice(&bytes[0..8]);

        let version_major = u16::from_le_bytes([bytes[8], bytes[9]]);
        let version_minor = u16::from_le_bytes([bytes[10], bytes[11]]);
        let state = ImageState::from_u8(bytes[12]);
        // bytes 13..16 are pad
        let block_size = u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
        let block_count = u64::from_le_bytes([
            bytes[20], bytes[21], bytes[22], bytes[23], bytes[24], bytes[25], bytes[26], bytes[27],
        ]);
        let generation = u64::from_le_bytes([
            bytes[28], bytes[29], bytes[30], bytes[31], bytes[32], bytes[33], bytes[34], bytes[35],
        ]);
        let meta_len = u32::from_le_bytes([bytes[36], bytes[37], bytes[38], bytes[39]]);
        let meta_crc = u32::from_le_bytes([bytes[40], bytes[41], bytes[42], bytes[43]]);

        let mut reserved = [0u8; 20];
        reserved.copy_from_slice(&bytes[44..64]);

        Ok(Superblock {
            magic,
            version_major,
            version_minor,
            state,
            block_size,
            block_count,
            generation,
            meta_len,
            meta_crc,
            reserved,
        })
    }
}
