use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use flashrpc_envelope::{encode, parse_slice, Envelope, ErrorObject, Params};
use flashrpc_frame::FrameCodec;
use flashrpc_transport::IpcStream;
#[cfg(unix)]
use flashrpc_transport::UnixDomainSocket;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::error::Result;

/// What the device does with one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Answer with a success envelope.
    Result(Value),
    /// Answer with an error envelope.
    Error(ErrorObject),
    /// Send nothing back.
    Silent,
}

/// Device-side implementation of the RPC methods.
pub trait MethodHandler: Send + Sync + 'static {
    fn handle(&self, method: &str, params: &Params) -> Reply;
}

/// Answer requests on `stream` until the host hangs up.
///
/// Requests get a success or error reply, notifications get none, and
/// frames that do not decode are answered with an id-less error.
pub async fn serve<H: MethodHandler>(stream: IpcStream, handler: Arc<H>) -> Result<()> {
    let mut framed = Framed::new(stream, FrameCodec::default());

    while let Some(frame) = framed.next().await {
        let payload = frame?;
        let reply = match parse_slice(&payload) {
            Ok(Envelope::Request { id, method, params }) => {
                debug!(%id, %method, "request");
                match handler.handle(&method, &params) {
                    Reply::Result(result) => Some(Envelope::Success { id, result }),
                    Reply::Error(error) => Some(Envelope::Error {
                        id: Some(id),
                        error,
                    }),
                    Reply::Silent => None,
                }
            }
            Ok(Envelope::Notification { method, params }) => {
                debug!(%method, "notification");
                let _ = handler.handle(&method, &params);
                None
            }
            Ok(other) => {
                debug!(kind = other.kind(), "ignoring completion sent to device");
                None
            }
            Err(err) => {
                warn!(error = %err, "rejecting undecodable frame");
                Some(Envelope::Error {
                    id: None,
                    error: err.to_error_object(),
                })
            }
        };

        if let Some(reply) = reply {
            framed.send(Bytes::from(encode(&reply))).await?;
        }
    }

    debug!("host closed channel");
    Ok(())
}

/// Accepts host connections on a Unix domain socket and serves each one.
#[cfg(unix)]
pub struct DeviceListener {
    socket: UnixDomainSocket,
}

#[cfg(unix)]
impl DeviceListener {
    /// Bind to a Unix domain socket path. Must be called inside a tokio runtime.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            socket: UnixDomainSocket::bind(path)?,
        })
    }

    /// Accept one host connection and serve it to completion.
    pub async fn serve_one<H: MethodHandler>(&self, handler: Arc<H>) -> Result<()> {
        let stream = self.socket.accept().await?;
        serve(stream, handler).await
    }

    /// Accept connections forever, serving each on its own task.
    pub async fn run<H: MethodHandler>(&self, handler: Arc<H>) -> Result<()> {
        let mut connections = 0u64;
        loop {
            let stream = self.socket.accept().await?;
            connections += 1;
            info!(connection = connections, "host connected");
            let handler = handler.clone();
            tokio::spawn(async move {
                if let Err(err) = serve(stream, handler).await {
                    warn!(connection = connections, error = %err, "connection ended with error");
                }
            });
        }
    }

    /// Bound socket path.
    pub fn path(&self) -> &Path {
        self.socket.path()
    }
}
