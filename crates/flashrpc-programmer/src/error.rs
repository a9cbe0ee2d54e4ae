use std::path::PathBuf;
use std::time::Duration;

use flashrpc_peer::PeerError;
use serde_json::Value;

/// Errors that can occur during transfers and erase.
#[derive(Debug, thiserror::Error)]
pub enum ProgrammerError {
    /// The chip name is not in the catalog.
    #[error("unknown chip '{0}'")]
    UnknownChip(String),

    /// The image cannot be split into whole write blocks.
    #[error("image length {len} is not a multiple of the {block_size}-byte write block")]
    LengthMismatch { len: usize, block_size: usize },

    /// The chip cannot be split into whole read blocks.
    #[error("chip capacity {capacity} is not a multiple of the {block_size}-byte read block")]
    CapacityNotAligned { capacity: u64, block_size: u64 },

    /// A block failed on every attempt; the transfer is over.
    #[error("block {block} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        block: u64,
        attempts: u32,
        last_error: String,
    },

    /// The device answered with a value of the wrong shape.
    #[error("{method} returned unexpected result: {value}")]
    UnexpectedResult { method: &'static str, value: Value },

    /// Read-back differs from the written image.
    #[error("verification failed at offset {offset:#x}: expected {expected:#04x}, read {actual:#04x}")]
    VerifyMismatch {
        offset: usize,
        expected: u8,
        actual: u8,
    },

    /// Read-back ended before covering the image.
    #[error("verification read {read} bytes, image has {expected}")]
    VerifyTruncated { read: usize, expected: usize },

    /// The device did not report erase completion in time.
    #[error("erase did not complete within {0:?}")]
    EraseTimeout(Duration),

    /// The chip catalog file could not be read.
    #[error("failed to read chip catalog {path}: {source}")]
    CatalogRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The chip catalog is not valid.
    #[error("invalid chip catalog: {0}")]
    CatalogParse(#[from] serde_json::Error),

    /// Channel or call failure outside of a retried block.
    #[error(transparent)]
    Peer(#[from] PeerError),
}

pub type Result<T> = std::result::Result<T, ProgrammerError>;
