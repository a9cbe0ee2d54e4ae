//! Channel management and call correlation for flashrpc.
//!
//! Turns a framed byte stream into awaitable JSON-RPC calls:
//! - [`ChannelManager`] owns the channel, reopens it lazily, and dispatches
//!   every inbound envelope to the call waiting for it.
//! - [`RpcClient`] allocates call ids, sends requests, and awaits the
//!   correlated response with a hard timeout.
//! - [`server`] answers requests on the device side of a channel.

pub mod client;
pub mod connector;
pub mod error;
pub mod manager;
pub mod server;

pub use client::{
    connect, connect_with_config, ClientConfig, RpcCaller, RpcClient, DEFAULT_CALL_TIMEOUT,
    DEFAULT_MAX_OUTSTANDING,
};
pub use connector::{Connector, LoopbackConnector, UdsConnector};
pub use error::{PeerError, Result};
pub use manager::{ChannelManager, DEFAULT_UNSOLICITED_CAPACITY};
pub use server::{serve, DeviceListener, MethodHandler, Reply};
