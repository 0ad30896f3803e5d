//! Command dispatch
//!
//! One invocation, one command, one response line. [`run`] is total:
//! every outcome, success or failure, renders to a wire token or
//! listing, so the binary never has to branch on errors.
//!
//! The load, mutate, commit window runs under the image lock. Commit
//! policy: mutating commands commit only when their operation
//! succeeded; `list` and `read` commit only when the load had to
//! recover, so a repaired image is persisted without a read-only
//! command otherwise touching the file (and never create an absent
//! image); `crash` bypasses commit entirely and tears the image in
//! place.

use crate::core::config::EngineConfig;
use crate::core::error::Result;
use crate::core::lock::ImageLock;
use crate::core::store::ImageStore;
use crate::core::wire;

/// A single engine command, as invoked through the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Create { name: String, content: String },
    Read { name: String },
    Update { name: String, content: String },
    Delete { name: String },
    Crash,
    Optimize,
}

/// Execute one command against the configured image and render the
/// response line.
pub fn run(config: &EngineConfig, command: Command) -> String {
    match execute(config, command) {
        Ok(line) => line,
        Err(err) => {
            tracing::debug!("command failed: {err}");
            wire::error_token(&err).to_string()
        }
    }
}

fn execute(config: &EngineConfig, command: Command) -> Result<String> {
    config.geometry.validate()?;

    let lock = ImageLock::acquire(&config.lock_path())?;
    let store = ImageStore::new(config);
    let loaded = store.load()?;
    let mut engine = loaded.engine;

    let line = match command {
        Command::List => {
            let line = wire::encode_listing(engine.list(), loaded.report.as_ref());
            if loaded.report.is_some() {
                store.commit(&engine, loaded.generation + 1)?;
            }
            line
        }
        Command::Read { name } => {
            let line = String::from_utf8_lossy(engine.read(&name)?).into_owned();
            if loaded.report.is_some() {
                store.commit(&engine, loaded.generation + 1)?;
            }
            line
        }
        Command::Create { name, content } => {
            let start = engine.create(&name, content.as_bytes())?;
            store.commit(&engine, loaded.generation + 1)?;
            wire::created_at(start)
        }
        Command::Update { name, content } => {
            engine.update(&name, content.as_bytes())?;
            store.commit(&engine, loaded.generation + 1)?;
            wire::OK_UPDATED.to_string()
        }
        Command::Delete { name } => {
            engine.delete(&name)?;
            store.commit(&engine, loaded.generation + 1)?;
            wire::OK_DELETED.to_string()
        }
        Command::Optimize => {
            engine.compact()?;
            store.commit(&engine, loaded.generation + 1)?;
            wire::OK_DEFRAGMENTED.to_string()
        }
        Command::Crash => {
            store.crash(&engine, loaded.generation + 1)?;
            // Release before returning so the very next command sees
            // the torn image instead of waiting out the lock.
            drop(lock);
            return Ok(wire::OK_HALTED.to_string());
        }
    };

    Ok(line)
}
