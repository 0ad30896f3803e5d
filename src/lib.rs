//! # vdiskfs - Simulated Block-Device Filesystem
//!
//! `vdiskfs` is a single-file virtual filesystem engine. An image file
//! stands in for a block device: fixed-size blocks, a contiguous
//! first-fit allocator, a flat directory, and a defragmenting
//! compactor, with features like:
//!
//! - **Atomic commits**: every command rewrites the image through a
//!   staged sibling file and a rename, so an interrupted run never
//!   corrupts the previous state
//! - **Corruption recovery**: a damaged image is salvaged entry by
//!   entry on the next load and the repair is reported, never fatal
//! - **Crash simulation**: a deliberate torn commit for exercising the
//!   recovery path end to end
//! - **Exclusive access**: a lock file serializes concurrent
//!   invocations against the same image
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vdiskfs::{dispatch, Command, EngineConfig, Geometry};
//!
//! let config = EngineConfig::new("vdisk.img", Geometry::default());
//!
//! // Each call is one full load-mutate-commit cycle.
//! let line = dispatch::run(&config, Command::Create {
//!     name: "notes".to_string(),
//!     content: "Hello, World!".to_string(),
//! });
//! assert_eq!(line, "SUCCESS:Created_at_Block_0");
//!
//! let listing = dispatch::run(&config, Command::List);
//! assert_eq!(listing, "notes,0,13");
//! ```
//!
//! The [`Engine`] type is also usable directly for in-memory work; the
//! dispatcher adds locking, persistence, and the wire format on top.

pub mod core;

// Re-export the user-facing surface
pub use crate::core::dispatch::{self, Command};
pub use crate::core::{
    config::{EngineConfig, Geometry},
    directory::FileEntry,
    engine::Engine,
    error::{FsError, Result},
    image::{RecoveryCause, RecoveryReport},
    wire::{decode_listing, encode_listing, ListRecord, Listing},
};
