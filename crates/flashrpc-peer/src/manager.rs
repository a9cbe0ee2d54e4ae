use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use flashrpc_envelope::{encode, parse_slice, Envelope, Id};
use flashrpc_frame::{FrameCodec, FrameConfig};
use flashrpc_transport::IpcStream;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::connector::Connector;
use crate::error::{PeerError, Result};

/// Default number of uncorrelated inbound envelopes kept for inspection.
pub const DEFAULT_UNSOLICITED_CAPACITY: usize = 64;

type FramedStream = Framed<IpcStream, FrameCodec>;

/// Owns the channel to one device and routes inbound envelopes.
///
/// At most one channel is active at a time. Completions are delivered
/// straight to the pending slot registered for their id; everything else
/// lands in a bounded FIFO that evicts its oldest entry when full.
pub struct ChannelManager<C> {
    connector: C,
    frame_config: FrameConfig,
    active: Option<ActiveChannel>,
    generation: u64,
    next_id: u64,
    routes: Arc<Mutex<Routes>>,
}

struct ActiveChannel {
    sink: SplitSink<FramedStream, Bytes>,
    open: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl Drop for ActiveChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

struct Pending {
    generation: u64,
    slot: oneshot::Sender<Envelope>,
}

struct Routes {
    pending: HashMap<u64, Pending>,
    unsolicited: VecDeque<Envelope>,
    capacity: usize,
}

impl Routes {
    fn deliver(&mut self, envelope: Envelope) {
        if envelope.is_completion() {
            if let Some(id) = envelope.id().and_then(Id::as_u64) {
                if let Some(pending) = self.pending.remove(&id) {
                    debug!(id, kind = envelope.kind(), "response correlated");
                    let _ = pending.slot.send(envelope);
                    return;
                }
            }
        }

        debug!(kind = envelope.kind(), id = ?envelope.id(), "uncorrelated envelope buffered");
        if self.unsolicited.len() >= self.capacity {
            self.unsolicited.pop_front();
        }
        self.unsolicited.push_back(envelope);
    }

    /// Drop the pending slots registered while `generation` was the active
    /// channel; their waiters observe a closed channel. Slots belonging to a
    /// newer channel are kept.
    fn fail_generation(&mut self, generation: u64) {
        let before = self.pending.len();
        self.pending.retain(|_, pending| pending.generation != generation);
        let failed = before - self.pending.len();
        if failed > 0 {
            warn!(generation, failed, "channel closed with calls outstanding");
        }
    }

    fn fail_all(&mut self) {
        if !self.pending.is_empty() {
            warn!(pending = self.pending.len(), "channel closed with calls outstanding");
        }
        self.pending.clear();
    }
}

impl<C: Connector> ChannelManager<C> {
    pub fn new(connector: C) -> Self {
        Self::with_config(connector, FrameConfig::default(), DEFAULT_UNSOLICITED_CAPACITY)
    }

    pub fn with_config(connector: C, frame_config: FrameConfig, unsolicited_capacity: usize) -> Self {
        Self {
            connector,
            frame_config,
            active: None,
            generation: 0,
            next_id: 1,
            routes: Arc::new(Mutex::new(Routes {
                pending: HashMap::new(),
                unsolicited: VecDeque::new(),
                capacity: unsolicited_capacity.max(1),
            })),
        }
    }

    /// True if a channel exists and its inbound side has not closed.
    pub fn is_open(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.open.load(Ordering::Acquire))
    }

    /// Open a channel unless one is already open.
    pub async fn ensure_open(&mut self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }
        if self.active.take().is_some() {
            debug!("replacing closed channel");
        }

        let endpoint = self.connector.describe();
        let stream = self
            .connector
            .connect()
            .await
            .map_err(PeerError::Connect)?;
        let framed = Framed::new(stream, FrameCodec::with_config(self.frame_config.clone()));
        let (sink, inbound) = framed.split();

        self.generation += 1;
        let open = Arc::new(AtomicBool::new(true));
        let reader = tokio::spawn(dispatch_inbound(
            inbound,
            self.routes.clone(),
            open.clone(),
            self.generation,
        ));
        self.active = Some(ActiveChannel { sink, open, reader });

        info!(%endpoint, generation = self.generation, "channel open");
        Ok(())
    }

    /// Allocate the next call id. Ids are never reused, even across reconnects.
    pub fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Register interest in the completion for `id`.
    pub fn register(&mut self, id: u64) -> oneshot::Receiver<Envelope> {
        let (slot, rx) = oneshot::channel();
        let generation = self.generation;
        self.routes().pending.insert(id, Pending { generation, slot });
        rx
    }

    /// Abandon the slot for `id`; a late reply will be buffered as unsolicited.
    pub fn forget(&mut self, id: u64) {
        self.routes().pending.remove(&id);
    }

    /// Send one envelope on the open channel.
    pub async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        let active = self
            .active
            .as_mut()
            .ok_or_else(|| PeerError::Disconnected("channel is not open".to_string()))?;
        let payload = Bytes::from(encode(envelope));
        if let Err(err) = active.sink.send(payload).await {
            active.open.store(false, Ordering::Release);
            return Err(err.into());
        }
        Ok(())
    }

    /// Take every buffered uncorrelated envelope, oldest first.
    pub fn drain_unsolicited(&mut self) -> Vec<Envelope> {
        self.routes().unsolicited.drain(..).collect()
    }

    /// Close the channel; outstanding calls fail with `Disconnected`.
    pub async fn close(&mut self) {
        if let Some(mut active) = self.active.take() {
            let _ = active.sink.close().await;
            active.open.store(false, Ordering::Release);
            debug!("channel closed by host");
        }
        self.routes().fail_all();
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.routes().pending.len()
    }

    fn routes(&self) -> MutexGuard<'_, Routes> {
        self.routes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn dispatch_inbound(
    mut inbound: SplitStream<FramedStream>,
    routes: Arc<Mutex<Routes>>,
    open: Arc<AtomicBool>,
    generation: u64,
) {
    while let Some(frame) = inbound.next().await {
        let payload = match frame {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "inbound frame error; closing channel");
                break;
            }
        };
        match parse_slice(&payload) {
            Ok(envelope) => routes
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .deliver(envelope),
            Err(err) => warn!(error = %err, size = payload.len(), "dropping undecodable envelope"),
        }
    }

    open.store(false, Ordering::Release);
    routes
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .fail_generation(generation);
    info!(generation, "channel closed by device");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use flashrpc_envelope::{ErrorObject, Params};
    use serde_json::{json, Value};

    use super::*;
    use crate::connector::LoopbackConnector;
    use crate::server::{MethodHandler, Reply};

    struct Echo;

    impl MethodHandler for Echo {
        fn handle(&self, method: &str, params: &Params) -> Reply {
            match method {
                "echo" => Reply::Result(params.to_value().unwrap_or(Value::Null)),
                "announce" => Reply::Silent,
                _ => Reply::Error(ErrorObject::method_not_found(method)),
            }
        }
    }

    struct FailingConnector {
        attempts: AtomicUsize,
    }

    impl Connector for FailingConnector {
        async fn connect(&self) -> flashrpc_transport::Result<IpcStream> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(flashrpc_transport::TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            )))
        }

        fn describe(&self) -> String {
            "failing".to_string()
        }
    }

    fn request(id: u64, method: &str) -> Envelope {
        Envelope::Request {
            id: Id::Num(id as i64),
            method: method.to_string(),
            params: Params::Array(vec![json!(id)]),
        }
    }

    #[tokio::test]
    async fn ensure_open_is_lazy_and_idempotent() {
        let mut manager = ChannelManager::new(LoopbackConnector::new(Arc::new(Echo)));
        assert!(!manager.is_open());

        manager.ensure_open().await.unwrap();
        assert!(manager.is_open());
        manager.ensure_open().await.unwrap();
        assert!(manager.is_open());
    }

    #[tokio::test]
    async fn connect_failure_is_channel_failure() {
        let mut manager = ChannelManager::new(FailingConnector {
            attempts: AtomicUsize::new(0),
        });
        let err = manager.ensure_open().await.unwrap_err();
        assert!(matches!(err, PeerError::Connect(_)));
        assert!(!manager.is_open());
        assert_eq!(manager.connector().attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn responses_resolve_their_own_slot() {
        let mut manager = ChannelManager::new(LoopbackConnector::new(Arc::new(Echo)));
        manager.ensure_open().await.unwrap();

        let first = manager.next_id();
        let second = manager.next_id();
        assert_eq!((first, second), (1, 2));

        let rx_second = manager.register(second);
        let rx_first = manager.register(first);
        manager.send(&request(first, "echo")).await.unwrap();
        manager.send(&request(second, "echo")).await.unwrap();

        let env = rx_second.await.unwrap();
        assert_eq!(
            env,
            Envelope::Success {
                id: Id::Num(2),
                result: json!([2])
            }
        );
        let env = rx_first.await.unwrap();
        assert_eq!(env.id(), Some(&Id::Num(1)));
    }

    #[tokio::test]
    async fn unmatched_replies_are_buffered_with_eviction() {
        let mut manager = ChannelManager::with_config(
            LoopbackConnector::new(Arc::new(Echo)),
            FrameConfig::default(),
            2,
        );
        manager.ensure_open().await.unwrap();

        for id in 1..=3 {
            manager.send(&request(id, "echo")).await.unwrap();
        }
        // Round-trip a correlated call so the three replies above are in.
        let marker = manager.register(4);
        manager.send(&request(4, "echo")).await.unwrap();
        marker.await.unwrap();

        let buffered: Vec<_> = manager
            .drain_unsolicited()
            .into_iter()
            .filter_map(|env| env.id().and_then(Id::as_u64))
            .collect();
        assert_eq!(buffered, vec![2, 3]);
    }

    #[tokio::test]
    async fn close_fails_outstanding_slots() {
        let mut manager = ChannelManager::new(LoopbackConnector::new(Arc::new(Echo)));
        manager.ensure_open().await.unwrap();

        let rx = manager.register(1);
        manager.send(&request(1, "announce")).await.unwrap();
        manager.close().await;

        assert!(rx.await.is_err());
        assert!(!manager.is_open());
    }

    #[tokio::test]
    async fn send_without_channel_is_disconnected() {
        let mut manager = ChannelManager::new(LoopbackConnector::new(Arc::new(Echo)));
        let err = manager.send(&request(1, "echo")).await.unwrap_err();
        assert!(matches!(err, PeerError::Disconnected(_)));
    }

    #[tokio::test]
    async fn stale_reader_leaves_newer_slots_alone() {
        let mut manager = ChannelManager::new(LoopbackConnector::new(Arc::new(Echo)));
        manager.ensure_open().await.unwrap();

        let id = manager.next_id();
        let rx = manager.register(id);

        // A reader left over from an earlier channel sees its stream end.
        let (stale, device) = IpcStream::pair(64);
        drop(device);
        let (_sink, inbound) = Framed::new(stale, FrameCodec::default()).split();
        dispatch_inbound(inbound, manager.routes.clone(), Arc::new(AtomicBool::new(true)), 0).await;
        assert_eq!(manager.pending_len(), 1);

        manager.send(&request(id, "echo")).await.unwrap();
        assert_eq!(rx.await.unwrap().id(), Some(&Id::Num(1)));
        assert!(manager.is_open());
    }
}
