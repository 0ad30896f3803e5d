//! Exclusive access to the image
//!
//! One command owns the image for its whole load, mutate, commit
//! window. Ownership is a sibling `<image>.lock` file created with
//! `create_new`, which is atomic on every platform we care about. The
//! guard removes the file on drop, so every exit path releases it. A
//! holder that died without cleaning up is detected by lock-file age
//! and its lock is broken.

use crate::core::error::{FsError, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// How long a command waits for the lock before failing busy.
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(2);

/// Pause between acquisition attempts.
pub const RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// A lock file older than this belongs to a dead holder. Commands are
/// short synchronous units of work; ten seconds is far past any live
/// holder's window.
pub const STALE_AFTER: Duration = Duration::from_secs(10);

/// Scoped exclusive ownership of an image.
#[derive(Debug)]
pub struct ImageLock {
    path: PathBuf,
}

impl ImageLock {
    /// Acquire the lock, waiting up to `ACQUIRE_TIMEOUT`.
    pub fn acquire(path: &Path) -> Result<Self> {
        Self::acquire_with(path, ACQUIRE_TIMEOUT, STALE_AFTER)
    }

    fn acquire_with(path: &Path, timeout: Duration, stale_after: Duration) -> Result<Self> {
        let started = Instant::now();

        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    // Holder PID, purely diagnostic.
                    let _ = write!(file, "{}", std::process::id());
                    return Ok(ImageLock {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Self::break_stale(path, stale_after) {
                        continue;
                    }
                    if started.elapsed() >= timeout {
                        return Err(FsError::Busy {
                            waited_ms: started.elapsed().as_millis() as u64,
                        });
                    }
                    std::thread::sleep(RETRY_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Remove a lock file whose holder is presumed dead. Returns true
    /// if it was removed and an acquisition retry is worthwhile.
    fn break_stale(path: &Path, stale_after: Duration) -> bool {
        let age = match Self::lock_age(path) {
            Some(age) if age >= stale_after => age,
            // Vanished or fresh; the retry loop handles it.
            _ => return false,
        };

        tracing::warn!(
            "breaking stale lock {} ({}s old)",
            path.display(),
            age.as_secs()
        );
        Self::remove_if_stale(path, stale_after)
    }

    /// Guarded unlink: the age is checked again immediately before the
    /// removal. A rival waiter may have broken the stale file and
    /// acquired since the first sighting; its fresh lock must survive.
    fn remove_if_stale(path: &Path, stale_after: Duration) -> bool {
        match Self::lock_age(path) {
            Some(age) if age >= stale_after => std::fs::remove_file(path).is_ok(),
            _ => false,
        }
    }

    fn lock_age(path: &Path) -> Option<Duration> {
        let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
        modified.elapsed().ok()
    }
}

impl Drop for ImageLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("failed to remove lock {}: {e}", self.path.display());
            }
        }
    }
}
