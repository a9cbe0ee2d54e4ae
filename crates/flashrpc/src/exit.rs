use std::fmt;
use std::io;

use flashrpc_frame::FrameError;
use flashrpc_peer::PeerError;
use flashrpc_programmer::ProgrammerError;
use flashrpc_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::Oversized { .. } | FrameError::BadMagic { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::Truncated { .. } => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn peer_error(context: &str, err: PeerError) -> CliError {
    match err {
        PeerError::Connect(err) | PeerError::Transport(err) => transport_error(context, err),
        PeerError::Frame(err) => frame_error(context, err),
        PeerError::Timeout { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        PeerError::InvalidEnvelope(_) | PeerError::Envelope(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        PeerError::Disconnected(_) | PeerError::Rpc { .. } => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
    }
}

pub fn programmer_error(context: &str, err: ProgrammerError) -> CliError {
    match err {
        ProgrammerError::Peer(err) => peer_error(context, err),
        ProgrammerError::CatalogRead { source, .. } => io_error(context, source),
        ProgrammerError::UnknownChip(_) => CliError::new(USAGE, format!("{context}: {err}")),
        ProgrammerError::EraseTimeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        ProgrammerError::RetriesExhausted { .. } => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        ProgrammerError::LengthMismatch { .. }
        | ProgrammerError::CapacityNotAligned { .. }
        | ProgrammerError::UnexpectedResult { .. }
        | ProgrammerError::VerifyMismatch { .. }
        | ProgrammerError::VerifyTruncated { .. }
        | ProgrammerError::CatalogParse(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
    }
}
