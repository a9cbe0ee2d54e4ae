use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use flashrpc_envelope::{notification, request, Envelope};
use flashrpc_frame::FrameConfig;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::connector::{Connector, UdsConnector};
use crate::error::{PeerError, Result};
use crate::manager::{ChannelManager, DEFAULT_UNSOLICITED_CAPACITY};

/// How long a caller waits for a correlated response by default.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(40);

/// Calls kept awaitable before the oldest is abandoned.
pub const DEFAULT_MAX_OUTSTANDING: usize = 64;

/// Configuration for an [`RpcClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Hard timeout for each awaited response. Default: 40 s.
    pub call_timeout: Duration,
    /// Frame limits for the underlying channel.
    pub frame: FrameConfig,
    /// Capacity of the uncorrelated-envelope buffer. Default: 64.
    pub unsolicited_capacity: usize,
    /// Calls sent but not yet awaited. Past this the oldest call is
    /// abandoned and its reply, if any, is buffered as unsolicited.
    /// Default: 64.
    pub max_outstanding: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            frame: FrameConfig::default(),
            unsolicited_capacity: DEFAULT_UNSOLICITED_CAPACITY,
            max_outstanding: DEFAULT_MAX_OUTSTANDING,
        }
    }
}

/// Anything that can perform a blocking-style RPC: send, then await the
/// correlated result.
///
/// The transfer protocol is written against this trait so it can run over a
/// real channel or a scripted device in tests.
pub trait RpcCaller: Send {
    fn request(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> impl Future<Output = Result<Value>> + Send;
}

impl<T: RpcCaller> RpcCaller for &mut T {
    fn request(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> impl Future<Output = Result<Value>> + Send {
        (**self).request(method, params)
    }
}

struct Outstanding {
    method: String,
    slot: oneshot::Receiver<Envelope>,
}

/// Turns fire-and-forget sends into awaitable calls.
pub struct RpcClient<C> {
    manager: ChannelManager<C>,
    outstanding: BTreeMap<u64, Outstanding>,
    config: ClientConfig,
}

/// Create a client for the device socket at `path`. The channel opens on the
/// first call.
pub fn connect(path: impl AsRef<Path>) -> RpcClient<UdsConnector> {
    connect_with_config(path, ClientConfig::default())
}

/// Create a client for the device socket at `path` with explicit configuration.
pub fn connect_with_config(path: impl AsRef<Path>, config: ClientConfig) -> RpcClient<UdsConnector> {
    RpcClient::with_config(UdsConnector::new(path), config)
}

impl<C: Connector> RpcClient<C> {
    pub fn new(connector: C) -> Self {
        Self::with_config(connector, ClientConfig::default())
    }

    pub fn with_config(connector: C, config: ClientConfig) -> Self {
        Self {
            manager: ChannelManager::with_config(
                connector,
                config.frame.clone(),
                config.unsolicited_capacity,
            ),
            outstanding: BTreeMap::new(),
            config,
        }
    }

    /// Send a request and return its id without waiting for the reply.
    ///
    /// Opens (or reopens) the channel first if needed. Only the newest
    /// `max_outstanding` calls stay awaitable.
    pub async fn call(&mut self, method: &str, params: Option<Value>) -> Result<u64> {
        self.manager.ensure_open().await?;

        let id = self.manager.next_id();
        let envelope = request(Value::from(id), Value::from(method), params)?;
        let slot = self.manager.register(id);
        if let Err(err) = self.manager.send(&envelope).await {
            self.manager.forget(id);
            return Err(err);
        }

        debug!(id, method, "call sent");
        self.outstanding.insert(
            id,
            Outstanding {
                method: method.to_string(),
                slot,
            },
        );
        while self.outstanding.len() > self.config.max_outstanding.max(1) {
            if let Some((stale, call)) = self.outstanding.pop_first() {
                warn!(id = stale, method = %call.method, "abandoning unawaited call");
                self.manager.forget(stale);
            }
        }
        Ok(id)
    }

    /// Send a notification; no id is allocated and no reply is expected.
    pub async fn notify(&mut self, method: &str, params: Option<Value>) -> Result<()> {
        self.manager.ensure_open().await?;
        let envelope = notification(Value::from(method), params)?;
        self.manager.send(&envelope).await
    }

    /// Wait up to `timeout` for the response to call `id`.
    ///
    /// An error envelope becomes [`PeerError::Rpc`]. An id that was never
    /// issued by this client (or was already awaited) can never match and
    /// times out.
    pub async fn await_response(&mut self, id: u64, timeout: Duration) -> Result<Value> {
        let Some(Outstanding { method, slot }) = self.outstanding.remove(&id) else {
            warn!(id, "awaiting an id with no outstanding call");
            tokio::time::sleep(timeout).await;
            return Err(PeerError::Timeout {
                method: "<unknown>".to_string(),
                id,
                timeout,
            });
        };

        match tokio::time::timeout(timeout, slot).await {
            Ok(Ok(Envelope::Success { result, .. })) => Ok(result),
            Ok(Ok(Envelope::Error { error, .. })) => Err(PeerError::Rpc { method, id, error }),
            Ok(Ok(other)) => Err(PeerError::Disconnected(format!(
                "unexpected {} envelope for {method} (id {id})",
                other.kind()
            ))),
            Ok(Err(_)) => Err(PeerError::Disconnected(format!(
                "channel closed while awaiting {method} (id {id})"
            ))),
            Err(_) => {
                self.manager.forget(id);
                Err(PeerError::Timeout {
                    method,
                    id,
                    timeout,
                })
            }
        }
    }

    /// Inbound envelopes that matched no outstanding call, oldest first.
    pub fn drain_unsolicited(&mut self) -> Vec<Envelope> {
        self.manager.drain_unsolicited()
    }

    /// Close the channel. The next call reopens it.
    pub async fn close(&mut self) {
        self.manager.close().await;
        self.outstanding.clear();
    }

    pub fn is_open(&self) -> bool {
        self.manager.is_open()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl<C: Connector> RpcCaller for RpcClient<C> {
    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.call(method, params).await?;
        let timeout = self.config.call_timeout;
        self.await_response(id, timeout).await
    }
}
