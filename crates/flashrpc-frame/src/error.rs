use std::io;

/// Failure to move a message across the device channel.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The bytes at a frame boundary are not `"FR"`; the stream is out of sync.
    #[error("bad frame header {found:02x?}, channel out of sync")]
    BadMagic { found: [u8; 2] },

    #[error("message of {len} bytes exceeds the {limit}-byte frame limit")]
    Oversized { len: usize, limit: usize },

    #[error("device channel I/O: {0}")]
    Io(#[from] io::Error),

    /// The peer hung up partway through a frame.
    #[error("device channel ended {buffered} bytes into a frame")]
    Truncated { buffered: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
