//! JSON-RPC 2.0 envelopes for flashrpc channels.
//!
//! Builds and validates the four envelope kinds (request, notification,
//! success, error) and classifies inbound text into one of them. Builders
//! take loosely typed JSON so validation failures come back as a list of
//! readable messages rather than a panic or a serialized envelope.

pub mod builder;
pub mod envelope;
pub mod error;
pub mod hook;
pub mod parse;

pub use builder::{error, notification, request, success};
pub use envelope::{encode, Envelope, Id, Params, JSONRPC_VERSION};
pub use error::{EnvelopeError, ErrorCode, ErrorObject, Result, ValidationErrors};
pub use hook::{clear_validation_hook, set_validation_hook, ValidationHook};
pub use parse::{parse, parse_slice};
