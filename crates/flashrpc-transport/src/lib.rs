//! Byte stream transports for flashrpc.
//!
//! Provides a unified async stream over the local transports a programmer
//! host can reach a device through:
//! - Unix domain sockets (Linux/macOS)
//! - In-memory duplex pipes (tests, loopback simulators)
//!
//! This is the lowest layer of flashrpc. Framing and RPC build on top of
//! the [`IpcStream`] type provided here.

pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use traits::{IpcStream, DEFAULT_PIPE_CAPACITY};

#[cfg(unix)]
pub use uds::UnixDomainSocket;
