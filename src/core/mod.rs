//! Engine internals
//!
//! - [`config`] - Image path and block geometry
//! - [`error`] - Error types for engine operations
//! - [`superblock`] - Fixed 64-byte image header
//! - [`alloc`] - First-fit contiguous free-space allocator
//! - [`directory`] - File table with name validation
//! - [`blocks`] - In-memory block region
//! - [`engine`] - Core operations: create, read, update, delete, compact
//! - [`image`] - Image encoding, decoding, and salvage recovery
//! - [`store`] - On-disk load, atomic commit, crash simulation
//! - [`lock`] - Exclusive-access lock file guard
//! - [`wire`] - Response line encoding and decoding
//! - [`dispatch`] - One command, one response line

pub mod alloc;
pub mod blocks;
pub mod config;
pub mod directory;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod image;
pub mod lock;
pub mod store;
pub mod superblock;
pub mod wire;
