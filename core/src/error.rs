use thiserror::Error;

#[derive(Debug, Error)]
pub enum MfsError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0} is not a directory")]
    NotADirectory(String),

    #[error("Entry already exists: {0}")]
    AlreadyExists(String),

    #[error("Out of space: requested {requested} buckets, only {allocated} could be allocated")]
    OutOfSpace { requested: u32, allocated: u32 },

    #[error("Corrupt volume: {0}")]
    CorruptVolume(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Bootloader missing: {0}")]
    BootloaderMissing(String),

    #[error("Sector range {sector}+{count} is outside the disk ({total} sectors)")]
    OutOfBounds { sector: u64, count: u64, total: u64 },

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Other error: {0}")]
    Other(String),
}

pub type MfsResult<T> = Result<T, MfsError>;
