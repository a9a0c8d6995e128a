//! Peer connection manager
//!
//! Tracks live peer streams keyed by address. Each connection's read loop owns
//! a guard that removes the entry when the loop exits, whichever way it exits.
//! Writes go through a per-connection lock so frames from concurrent
//! broadcasts never interleave on the wire.

use super::frame::{Frame, FrameCodec, MessageType};
use crate::utils::{connection_span, RetryPolicy};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::future::join_all;
use futures::StreamExt;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, field, info, instrument, warn, Instrument, Span};
use uuid::Uuid;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Receives every known-type frame read from a peer
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, peer: &str, message_type: MessageType, payload: Bytes) -> Result<()>;
}

/// Which side opened the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Peer manager settings
#[derive(Debug, Clone)]
pub struct PeerManagerConfig {
    /// Identity announced in CONNECT
    pub identity: String,
    pub connect_timeout: Duration,
    /// Upper bound on one frame write, lock wait included
    pub write_timeout: Duration,
    pub max_peers: usize,
    pub write_retry: RetryPolicy,
}

impl PeerManagerConfig {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            connect_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(10),
            max_peers: 128,
            write_retry: RetryPolicy::peer_write(),
        }
    }
}

/// One live peer stream
pub struct PeerConnection {
    id: Uuid,
    key: String,
    direction: Direction,
    identity: RwLock<Option<String>>,
    writer: Mutex<BoxedWriter>,
    closed: CancellationToken,
    connected_at: Instant,
}

impl PeerConnection {
    fn new(key: String, writer: BoxedWriter, direction: Direction) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            direction,
            identity: RwLock::new(None),
            writer: Mutex::new(writer),
            closed: CancellationToken::new(),
            connected_at: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Identity announced by the peer's CONNECT, if any
    pub fn identity(&self) -> Option<String> {
        self.identity.read().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Write one encoded frame.
    ///
    /// A failure or timeout part-way through a frame leaves the stream in an
    /// unknown state, so the connection is closed and never written again.
    async fn write_frame(&self, bytes: &Bytes, write_timeout: Duration) -> Result<()> {
        if self.is_closed() {
            return Err(Error::invalid_state(format!("Connection to {} is closed", self.key)));
        }

        let deadline = tokio::time::Instant::now() + write_timeout;
        let mut writer = tokio::time::timeout_at(deadline, self.writer.lock())
            .await
            .map_err(|_| Error::timeout(format!("write lock for {}", self.key)))?;

        let outcome = tokio::time::timeout_at(deadline, async {
            writer.write_all(bytes).await?;
            writer.flush().await
        })
        .await;

        match outcome {
            Ok(Ok(())) => Ok(()),
            // A poisoned stream is never retried, so report it as a protocol failure
            Ok(Err(e)) => {
                self.closed.cancel();
                let _ = writer.shutdown().await;
                Err(Error::protocol(format!("write to {} failed: {}", self.key, e)))
            }
            Err(_) => {
                self.closed.cancel();
                Err(Error::protocol(format!("write to {} timed out mid-frame", self.key)))
            }
        }
    }
}

/// Snapshot of a tracked peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSummary {
    pub key: String,
    pub identity: Option<String>,
    pub direction: Direction,
    pub connected_secs: u64,
}

/// Outcome of writing one frame to many peers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
}

impl BroadcastReport {
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Removes a connection from the map when its read loop ends
struct ConnectionGuard {
    manager: Arc<PeerManager>,
    key: String,
    id: Uuid,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.manager.detach(&self.key, self.id) {
            info!(peer = %self.key, "Peer removed");
        }
    }
}

/// Set of live peer connections
pub struct PeerManager {
    config: PeerManagerConfig,
    connections: DashMap<String, Arc<PeerConnection>>,
    frames_received: AtomicUsize,
}

impl PeerManager {
    pub fn new(config: PeerManagerConfig) -> Self {
        Self {
            config,
            connections: DashMap::new(),
            frames_received: AtomicUsize::new(0),
        }
    }

    pub fn identity(&self) -> &str {
        &self.config.identity
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.connections.contains_key(key)
    }

    pub fn frames_received(&self) -> usize {
        self.frames_received.load(Ordering::Relaxed)
    }

    pub fn peers(&self) -> Vec<PeerSummary> {
        let mut peers: Vec<PeerSummary> = self
            .connections
            .iter()
            .map(|entry| {
                let conn = entry.value();
                PeerSummary {
                    key: conn.key.clone(),
                    identity: conn.identity(),
                    direction: conn.direction,
                    connected_secs: conn.connected_at.elapsed().as_secs(),
                }
            })
            .collect();
        peers.sort_by(|a, b| a.key.cmp(&b.key));
        peers
    }

    /// Track a connection. A previous connection under the same key is closed
    /// and replaced; its read loop will not remove the new entry.
    pub fn attach<W>(&self, key: impl Into<String>, writer: W, direction: Direction) -> Arc<PeerConnection>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let key = key.into();
        let connection = Arc::new(PeerConnection::new(key.clone(), Box::new(writer), direction));
        if let Some(previous) = self.connections.insert(key.clone(), Arc::clone(&connection)) {
            debug!(peer = %key, "Replacing existing connection");
            previous.closed.cancel();
        }
        connection
    }

    /// Remove `key` only if it still refers to connection `id`
    fn detach(&self, key: &str, id: Uuid) -> bool {
        match self.connections.remove_if(key, |_, conn| conn.id == id) {
            Some((_, conn)) => {
                conn.closed.cancel();
                true
            }
            None => false,
        }
    }

    /// Service an accepted TCP stream until it closes
    pub async fn handle_inbound(
        self: &Arc<Self>,
        stream: TcpStream,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<()> {
        let key = stream.peer_addr()?.to_string();
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        self.serve(key, reader, writer, Direction::Inbound, handler).await
    }

    /// Track a stream and run its read loop to completion
    pub async fn serve<R, W>(
        self: &Arc<Self>,
        key: impl Into<String>,
        reader: R,
        writer: W,
        direction: Direction,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<()>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let connection = self.attach(key, writer, direction);
        Arc::clone(self).read_loop(connection, reader, handler).await
    }

    /// Dial a peer, announce our identity and service the stream in the background
    #[instrument(skip(self, handler), fields(identity = %self.config.identity))]
    pub async fn connect(self: &Arc<Self>, addr: &str, handler: Arc<dyn MessageHandler>) -> Result<String> {
        if self.contains(addr) {
            debug!("Already connected to {}", addr);
            return Ok(addr.to_string());
        }

        let stream = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::timeout(format!("connect to {}", addr)))?
            .map_err(|e| Error::peer(addr, format!("connect failed: {}", e)))?;
        stream.set_nodelay(true)?;

        let (reader, writer) = stream.into_split();
        let connection = self.attach(addr, writer, Direction::Outbound);

        let hello = Frame::new(MessageType::Connect, self.config.identity.clone()).encode()?;
        if let Err(e) = connection.write_frame(&hello, self.config.write_timeout).await {
            self.detach(addr, connection.id);
            return Err(e);
        }

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = manager.read_loop(connection, reader, handler).await {
                warn!("Outbound connection ended with error: {}", e);
            }
        });

        info!("Connected to peer {}", addr);
        Ok(addr.to_string())
    }

    /// Accept peers until `shutdown` fires, one task per connection
    pub async fn run_listener(
        self: Arc<Self>,
        listener: TcpListener,
        handler: Arc<dyn MessageHandler>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        if self.len() >= self.config.max_peers {
                            warn!("Max peers reached, rejecting {}", addr);
                            continue;
                        }
                        let manager = Arc::clone(&self);
                        let handler = Arc::clone(&handler);
                        tokio::spawn(async move {
                            if let Err(e) = manager.handle_inbound(stream, handler).await {
                                warn!("Peer {} error: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Accept failed: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
                _ = shutdown.cancelled() => {
                    info!("Peer listener shutting down");
                    break;
                }
            }
        }
    }

    async fn read_loop<R>(
        self: Arc<Self>,
        connection: Arc<PeerConnection>,
        reader: R,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<()>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let _guard = ConnectionGuard {
            manager: Arc::clone(&self),
            key: connection.key.clone(),
            id: connection.id,
        };
        let span = connection_span(&connection.key, &connection.id, connection.direction.as_str());

        async move {
            debug!("Read loop started");
            let mut frames = FramedRead::new(reader, FrameCodec::default());

            loop {
                let next = tokio::select! {
                    next = frames.next() => next,
                    _ = connection.closed.cancelled() => {
                        debug!("Connection closed locally");
                        return Ok(());
                    }
                };

                match next {
                    Some(Ok(frame)) => self.dispatch(&connection, frame, handler.as_ref()).await,
                    Some(Err(e)) => {
                        warn!("Dropping connection: {}", e);
                        return Err(e);
                    }
                    None => {
                        info!("Peer closed the connection");
                        return Ok(());
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, connection: &PeerConnection, frame: Frame, handler: &dyn MessageHandler) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);

        let Some(message_type) = frame.message_type() else {
            warn!(tag = frame.tag, len = frame.payload.len(), "Ignoring unknown message type");
            return;
        };

        if message_type == MessageType::Connect {
            let identity = String::from_utf8_lossy(&frame.payload).trim().to_string();
            Span::current().record("identity", field::display(&identity));
            info!("Peer announced identity {}", identity);
            *connection.identity.write() = Some(identity);
        }

        if let Err(e) = handler.handle(&connection.key, message_type, frame.payload).await {
            warn!(category = e.category(), "Failed to handle {}: {}", message_type, e);
        }
    }

    async fn write_with_retry(&self, connection: &PeerConnection, bytes: &Bytes) -> Result<()> {
        let result = self
            .config
            .write_retry
            .execute(|| connection.write_frame(bytes, self.config.write_timeout))
            .await;

        if result.is_err() && connection.is_closed() {
            self.detach(&connection.key, connection.id);
        }
        result
    }

    /// Write one message to every tracked peer
    pub async fn broadcast(&self, message_type: MessageType, payload: impl Into<Bytes>) -> Result<BroadcastReport> {
        self.broadcast_except(message_type, payload, None).await
    }

    /// Write one message to every tracked peer except `exclude`.
    ///
    /// The frame is encoded once. Peers whose write fails are logged and
    /// skipped; the rest still receive the message.
    pub async fn broadcast_except(
        &self,
        message_type: MessageType,
        payload: impl Into<Bytes>,
        exclude: Option<&str>,
    ) -> Result<BroadcastReport> {
        let bytes = Frame::new(message_type, payload).encode()?;

        // Snapshot so no map shard lock is held across a write
        let targets: Vec<Arc<PeerConnection>> = self
            .connections
            .iter()
            .filter(|entry| Some(entry.key().as_str()) != exclude)
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let writes = targets.iter().map(|connection| {
            let bytes = &bytes;
            async move {
                let result = self.write_with_retry(connection, bytes).await;
                (connection.key.clone(), result)
            }
        });

        let mut report = BroadcastReport::default();
        for (key, result) in join_all(writes).await {
            match result {
                Ok(()) => report.succeeded.push(key),
                Err(e) => {
                    warn!(peer = %key, "Skipping peer in {} broadcast: {}", message_type, e);
                    report.failed.push(key);
                }
            }
        }

        debug!(
            "{} sent to {}/{} peers",
            message_type,
            report.succeeded.len(),
            report.attempted()
        );
        Ok(report)
    }

    /// Write one message to a single peer
    pub async fn send_to(&self, key: &str, message_type: MessageType, payload: impl Into<Bytes>) -> Result<()> {
        let connection = self
            .connections
            .get(key)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::peer(key, "not connected"))?;

        let bytes = Frame::new(message_type, payload).encode()?;
        self.write_with_retry(&connection, &bytes).await
    }

    /// Close every connection; read loops exit and remove themselves
    pub fn close_all(&self) {
        for entry in self.connections.iter() {
            entry.value().closed.cancel();
        }
    }
}
