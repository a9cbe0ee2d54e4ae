use std::path::PathBuf;

/// Errors raised while opening or using a byte stream to the device.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The device side could not bind its socket path.
    #[error("cannot bind device socket {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The host could not reach the device socket.
    #[error("cannot reach device at {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("accepting host connection failed: {0}")]
    Accept(std::io::Error),

    /// Read or write failure on an established stream.
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `sun_path` cannot hold the socket path.
    #[error("socket path is {len} bytes, limit is {max}: {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },
}

pub type Result<T> = std::result::Result<T, TransportError>;
