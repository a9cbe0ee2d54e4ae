use std::time::Duration;

use flashrpc_envelope::{EnvelopeError, ErrorObject, ValidationErrors};

/// Errors that can occur in channel and call operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// The channel could not be established.
    #[error("channel connect failed: {0}")]
    Connect(#[source] flashrpc_transport::TransportError),

    /// Transport-level error outside of connecting.
    #[error("transport error: {0}")]
    Transport(#[from] flashrpc_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] flashrpc_frame::FrameError),

    /// The channel closed while a caller depended on it.
    #[error("channel disconnected: {0}")]
    Disconnected(String),

    /// An outbound envelope failed validation.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(#[from] ValidationErrors),

    /// An inbound envelope could not be decoded.
    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    /// The device answered with an error envelope.
    #[error("{method} (id {id}) failed: {error}")]
    Rpc {
        method: String,
        id: u64,
        error: ErrorObject,
    },

    /// No response arrived in time.
    #[error("{method} (id {id}) timed out after {timeout:?}")]
    Timeout {
        method: String,
        id: u64,
        timeout: Duration,
    },
}

pub type Result<T> = std::result::Result<T, PeerError>;
