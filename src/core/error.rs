use thiserror::Error;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("File already exists: {0}")]
    DuplicateName(String),

    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("Out of space: requested {requested} blocks, largest free run is {largest_free}")]
    OutOfSpace { requested: u64, largest_free: u64 },

    #[error("Invalid block range: [{start}, {start}+{len}) outside device of {block_count} blocks")]
    InvalidRange {
        start: u64,
        len: u64,
        block_count: u64,
    },

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Image busy: lock not acquired after {waited_ms} ms")]
    Busy { waited_ms: u64 },

    #[error("Image corrupted: {0}")]
    Corrupted(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, FsError>;
