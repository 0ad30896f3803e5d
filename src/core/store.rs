//! Image file store
//!
//! Owns every touch of the image path: loading with recovery, atomic
//! commit through a staged sibling file, and the deliberate torn commit
//! behind the `crash` command. Nothing else in the crate opens the
//! image.

use crate::core::config::EngineConfig;
use crate::core::engine::Engine;
use crate::core::error::Result;
use crate::core::image::{self, RecoveryReport};
use crate::core::superblock::{ImageState, SUPERBLOCK_LEN};
use std::fs::OpenOptions;
use std::io::Write;

/// Result of mounting the image at the start of a command.
pub struct LoadedState {
    pub engine: Engine,
    /// Commit counter read from the image; the next commit writes
    /// `generation + 1`.
    pub generation: u64,
    /// Whether the image file was present on disk.
    pub existed: bool,
    /// Set when the load had to recover.
    pub report: Option<RecoveryReport>,
}

pub struct ImageStore {
    config: EngineConfig,
}

impl ImageStore {
    pub fn new(config: &EngineConfig) -> Self {
        ImageStore {
            config: config.clone(),
        }
    }

    /// Mount the image. An absent file yields a fresh empty engine
    /// sized by the configured geometry without creating anything on
    /// disk; an existing image's header geometry is authoritative.
    pub fn load(&self) -> Result<LoadedState> {
        let bytes = match std::fs::read(&self.config.image) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LoadedState {
                    engine: Engine::new(self.config.geometry),
                    generation: 0,
                    existed: false,
                    report: None,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let (engine, generation, report) = image::decode(&bytes, self.config.geometry);

        if let Some(report) = &report {
            tracing::warn!(
                "recovered image {}: {} ({} salvaged, {} dropped)",
                self.config.image.display(),
                report.cause.message(),
                report.salvaged,
                report.dropped
            );
        }
        if engine.geometry() != self.config.geometry {
            tracing::debug!(
                "image geometry {}x{} overrides configured {}x{}",
                engine.geometry().block_count,
                engine.geometry().block_size,
                self.config.geometry.block_count,
                self.config.geometry.block_size
            );
        }

        Ok(LoadedState {
            engine,
            generation,
            existed: true,
            report,
        })
    }

    /// Atomically replace the image with a clean encoding of `engine`.
    ///
    /// The complete new image goes to a sibling staging file first,
    /// synced, then renamed over the authoritative path. An
    /// interruption before the rename leaves the previous image
    /// untouched; the rename itself is the swap the crash simulator
    /// targets.
    pub fn commit(&self, engine: &Engine, generation: u64) -> Result<()> {
        let bytes = image::encode(engine, generation, ImageState::Clean)?;
        let staging = self.config.staging_path();

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&staging)?;
        file.write_all(&bytes)?;
        file.flush()?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&staging, &self.config.image)?;
        Ok(())
    }

    /// Deliberate torn commit, in place on the authoritative image.
    ///
    /// Emulates an interruption inside the swap window: the superblock
    /// carries the commit-in-progress marker and the write stops at the
    /// end of the last live block, so trailing free space never reaches
    /// the disk. The next load detects the marker and salvages; no
    /// fully-committed file is harmed because only free bytes are
    /// missing.
    pub fn crash(&self, engine: &Engine, generation: u64) -> Result<()> {
        let bytes = image::encode(engine, generation, ImageState::Committing)?;

        let meta_len = bytes.len() - SUPERBLOCK_LEN - engine.blocks().region().len();
        let last_live = engine
            .directory()
            .entries()
            .iter()
            .map(|e| e.range().end())
            .max()
            .unwrap_or(0);
        let keep =
            SUPERBLOCK_LEN + meta_len + (last_live * engine.geometry().block_size as u64) as usize;

        tracing::warn!(
            "simulating crash: tearing {} at {} of {} bytes",
            self.config.image.display(),
            keep,
            bytes.len()
        );

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.config.image)?;
        file.write_all(&bytes[..keep])?;
        file.flush()?;
        file.sync_all()?;

        Ok(())
    }
}
