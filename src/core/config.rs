use std::path::{Path, PathBuf};

use crate::core::error::{FsError, Result};

/// Default image path when `--image` is not given.
pub const DEFAULT_IMAGE: &str = "vdisk.img";

/// Default block size in bytes for a freshly formatted image.
pub const DEFAULT_BLOCK_SIZE: u32 = 1024;

/// Default block count for a freshly formatted image.
pub const DEFAULT_BLOCK_COUNT: u64 = 64;

/// Largest accepted block size (1 MiB).
pub const MAX_BLOCK_SIZE: u32 = 1024 * 1024;

/// Upper bound on the block region (`block_size * block_count`, 256 MiB).
///
/// Also enforced against geometry decoded from an image header, so a
/// corrupt header can never drive a multi-gigabyte buffer allocation.
pub const MAX_DEVICE_BYTES: u64 = 256 * 1024 * 1024;

/// Block-device shape of an image: block size and block count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub block_size: u32,
    pub block_count: u64,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            block_count: DEFAULT_BLOCK_COUNT,
        }
    }
}

impl Geometry {
    pub fn new(block_size: u32, block_count: u64) -> Result<Self> {
        let geometry = Self {
            block_size,
            block_count,
        };
        geometry.validate()?;
        Ok(geometry)
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(FsError::InvalidGeometry("block size must be non-zero".into()));
        }
        if self.block_size > MAX_BLOCK_SIZE {
            return Err(FsError::InvalidGeometry(format!(
                "block size {} exceeds maximum {}",
                self.block_size, MAX_BLOCK_SIZE
            )));
        }
        if self.block_count == 0 {
            return Err(FsError::InvalidGeometry("block count must be non-zero".into()));
        }
        let bytes = (self.block_size as u64).checked_mul(self.block_count);
        match bytes {
            Some(b) if b <= MAX_DEVICE_BYTES => Ok(()),
            _ => Err(FsError::InvalidGeometry(format!(
                "device of {} blocks x {} bytes exceeds maximum {} bytes",
                self.block_count, self.block_size, MAX_DEVICE_BYTES
            ))),
        }
    }

    /// Total bytes in the block region.
    pub fn device_bytes(&self) -> u64 {
        self.block_size as u64 * self.block_count
    }

    /// Blocks needed to hold `size` bytes. Zero bytes occupy zero
    /// blocks. Total for any `size`, including sizes decoded from a
    /// corrupt image, so callers can compare without pre-checking.
    pub fn blocks_for(&self, size: u64) -> u64 {
        size.div_ceil(self.block_size as u64)
    }
}

/// Everything a single command invocation needs to know about its target.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path of the authoritative image file.
    pub image: PathBuf,
    /// Geometry used when formatting a new image. Ignored for existing
    /// images, whose header geometry is authoritative.
    pub geometry: Geometry,
}

impl EngineConfig {
    pub fn new(image: impl AsRef<Path>, geometry: Geometry) -> Self {
        Self {
            image: image.as_ref().to_path_buf(),
            geometry,
        }
    }

    /// Sibling path used for the atomic commit staging file.
    pub fn staging_path(&self) -> PathBuf {
        let mut name = self.image.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.image.with_file_name(name)
    }

    /// Sibling path of the exclusive-access lock file.
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self.image.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        self.image.with_file_name(name)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            image: PathBuf::from(DEFAULT_IMAGE),
            geometry: Geometry::default(),
        }
    }
}
