//! vdiskfs CLI
//!
//! One invocation runs one command against the image and prints
//! exactly one response line on stdout. Logs go to stderr so the
//! response line stays parseable.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vdiskfs::core::config::{DEFAULT_BLOCK_COUNT, DEFAULT_BLOCK_SIZE, DEFAULT_IMAGE};
use vdiskfs::{dispatch, Command, EngineConfig, Geometry};

#[derive(Parser, Debug)]
#[command(name = "vdiskfs")]
#[command(about = "Simulated block-device filesystem in a single image file")]
#[command(version)]
struct Args {
    /// Path to the image file
    #[arg(long, global = true, default_value = DEFAULT_IMAGE)]
    image: PathBuf,

    /// Block size in bytes; applies when the image is first created
    #[arg(long, global = true, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: u32,

    /// Number of blocks; applies when the image is first created
    #[arg(long, global = true, default_value_t = DEFAULT_BLOCK_COUNT)]
    block_count: u64,

    #[command(subcommand)]
    verb: Verb,
}

#[derive(Subcommand, Debug)]
enum Verb {
    /// List all files as name,start,size records
    List,
    /// Create a file with the given content
    Create { name: String, content: String },
    /// Print a file's content
    Read { name: String },
    /// Replace a file's content
    Update { name: String, content: String },
    /// Delete a file
    Delete { name: String },
    /// Tear the image mid-commit to exercise recovery
    Crash,
    /// Defragment: pack files back-to-back from block 0
    Optimize,
}

impl From<Verb> for Command {
    fn from(verb: Verb) -> Self {
        match verb {
            Verb::List => Command::List,
            Verb::Create { name, content } => Command::Create { name, content },
            Verb::Read { name } => Command::Read { name },
            Verb::Update { name, content } => Command::Update { name, content },
            Verb::Delete { name } => Command::Delete { name },
            Verb::Crash => Command::Crash,
            Verb::Optimize => Command::Optimize,
        }
    }
}

fn main() -> anyhow::Result<()> {
    // stdout carries the response line; everything else goes to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let geometry = Geometry {
        block_size: args.block_size,
        block_count: args.block_count,
    };
    let config = EngineConfig::new(args.image, geometry);

    println!("{}", dispatch::run(&config, args.verb.into()));
    Ok(())
}
