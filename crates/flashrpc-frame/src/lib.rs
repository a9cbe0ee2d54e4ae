//! Length-prefixed message framing for flashrpc.
//!
//! Turns a byte stream into an order-preserving message channel. Every
//! message is framed with:
//! - A 2-byte magic number ("FR") for stream synchronization
//! - A 4-byte little-endian payload length
//!
//! One frame carries exactly one JSON envelope.

pub mod codec;
pub mod error;

pub use codec::{
    decode_frame, encode_frame, FrameCodec, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE, MAGIC,
};
pub use error::{FrameError, Result};
