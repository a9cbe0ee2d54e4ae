//! Program SPI flash chips through a JSON-RPC programmer device.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte stream transports (Unix sockets, in-memory pipes)
//! - [`frame`]: length-prefixed message framing
//! - [`envelope`]: JSON-RPC 2.0 envelope building, parsing and validation
//! - [`peer`]: channel management, call correlation and device-side dispatch
//! - [`programmer`]: checksummed block transfer, erase and chip catalog

/// Re-export transport types.
pub mod transport {
    pub use flashrpc_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use flashrpc_frame::*;
}

/// Re-export envelope types.
pub mod envelope {
    pub use flashrpc_envelope::*;
}

/// Re-export peer types.
pub mod peer {
    pub use flashrpc_peer::*;
}

/// Re-export programmer types.
pub mod programmer {
    pub use flashrpc_programmer::*;
}
