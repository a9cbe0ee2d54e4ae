use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flashrpc_transport::{IpcStream, DEFAULT_PIPE_CAPACITY};

use crate::server::{serve, MethodHandler};

/// Source of fresh channel streams.
///
/// The channel manager calls `connect` every time it needs to (re)open the
/// channel.
pub trait Connector: Send + Sync + 'static {
    /// Establish a new stream to the device.
    fn connect(
        &self,
    ) -> impl Future<Output = flashrpc_transport::Result<IpcStream>> + Send;

    /// Human-readable endpoint for logs.
    fn describe(&self) -> String;
}

/// Connects to a device over a Unix domain socket path.
#[derive(Debug, Clone)]
pub struct UdsConnector {
    path: PathBuf,
}

impl UdsConnector {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Connector for UdsConnector {
    #[cfg(unix)]
    async fn connect(&self) -> flashrpc_transport::Result<IpcStream> {
        flashrpc_transport::UnixDomainSocket::connect(&self.path).await
    }

    #[cfg(not(unix))]
    async fn connect(&self) -> flashrpc_transport::Result<IpcStream> {
        Err(flashrpc_transport::TransportError::Connect {
            path: self.path.clone(),
            source: std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "unix domain sockets are not available on this platform",
            ),
        })
    }

    fn describe(&self) -> String {
        format!("unix:{}", self.path.display())
    }
}

/// Connects to an in-process device: every connect spawns a fresh server
/// task for `handler` on the other end of an in-memory pipe.
pub struct LoopbackConnector<H> {
    handler: Arc<H>,
    capacity: usize,
}

impl<H: MethodHandler> LoopbackConnector<H> {
    pub fn new(handler: Arc<H>) -> Self {
        Self {
            handler,
            capacity: DEFAULT_PIPE_CAPACITY,
        }
    }

    /// Override the in-memory pipe buffer size.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }
}

impl<H: MethodHandler> Connector for LoopbackConnector<H> {
    async fn connect(&self) -> flashrpc_transport::Result<IpcStream> {
        let (host, device) = IpcStream::pair(self.capacity);
        let handler = self.handler.clone();
        tokio::spawn(async move {
            if let Err(err) = serve(device, handler).await {
                tracing::debug!(error = %err, "loopback device stopped");
            }
        });
        Ok(host)
    }

    fn describe(&self) -> String {
        "loopback".to_string()
    }
}
