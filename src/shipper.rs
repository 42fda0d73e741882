//! Connection lifecycle and delivery orchestration.
//!
//! A [`Shipper`] is a cheap handle the producer writes through; the actual
//! state machine runs on a spawned worker task that owns the connector,
//! the retry policy, and the live connection. The worker moves between
//! four states: disconnected, connecting, connected, and exhausted (retry
//! budget spent). Producer writes never block on any of it: while no
//! connection is up they land in the offline ring buffer, which is drained
//! oldest-first through the send path on the next successful connect.
//!
//! # Example
//!
//! ```rust,no_run
//! use log_shipper::{Shipper, ShipperConfig};
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() -> log_shipper::Result<()> {
//!     let shipper: Shipper<Value> = Shipper::new(ShipperConfig::new("logs.example.com", 5170))?;
//!     shipper.write(json!({"level": 30, "msg": "hello"}));
//!     shipper.close().await;
//!     Ok(())
//! }
//! ```

use crate::buffer::RingBuffer;
use crate::config::ShipperConfig;
use crate::event::{EventFanout, ShipperEvent};
use crate::retry::RetryStrategy;
use crate::transport::{Connection, Connector, TcpConnector};
use crate::Result;
use bytes::Bytes;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

type Transform<T> = Box<dyn Fn(T) -> T + Send + 'static>;

enum Command<T> {
    Write(T),
    /// The producer buffered an entry after the connected flag flipped;
    /// the worker should push the buffer through the send path.
    Flush,
    Close,
}

/// State shared between the producer-facing handle and the worker.
///
/// Lock scopes are short and never span an await.
struct Shared<T> {
    buffer: Mutex<RingBuffer<T>>,
    connected: AtomicBool,
    events: EventFanout,
}

fn lock<'a, T>(buffer: &'a Mutex<RingBuffer<T>>) -> MutexGuard<'a, RingBuffer<T>> {
    buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Producer-facing handle to a running shipper.
///
/// Dropping the handle stops the worker the same way [`close`](Self::close)
/// does, minus the chance to await its exit.
pub struct Shipper<T> {
    shared: Arc<Shared<T>>,
    cmd_tx: mpsc::UnboundedSender<Command<T>>,
    worker: tokio::task::JoinHandle<()>,
}

impl<T> Shipper<T>
where
    T: Serialize + Send + 'static,
{
    /// Builds a shipper with the default TCP transport and the retry
    /// policy named in the configuration, then starts connecting.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the
    /// configuration fails validation.
    pub fn new(config: ShipperConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Starts building a shipper, for callers that need a transform,
    /// a custom retry policy, or a non-TCP connector.
    pub fn builder(config: ShipperConfig) -> ShipperBuilder<T, TcpConnector> {
        let connector = TcpConnector::new(config.address());
        ShipperBuilder {
            config,
            connector,
            transform: None,
            strategy: None,
        }
    }

    /// Hands one entry to the shipper.
    ///
    /// Never blocks and never fails: when a connection is live the entry
    /// goes to the worker for encoding and delivery, otherwise it is
    /// buffered (and may eventually be overwritten, which is counted, not
    /// raised).
    pub fn write(&self, entry: T) {
        if self.shared.connected.load(Ordering::Acquire) {
            if let Err(mpsc::error::SendError(Command::Write(entry))) =
                self.cmd_tx.send(Command::Write(entry))
            {
                // Worker already gone; fall back to the buffering contract.
                lock(&self.shared.buffer).add(entry);
            }
        } else {
            lock(&self.shared.buffer).add(entry);
            // The worker may have connected and drained between the flag
            // check and the add, which would leave this entry sitting out
            // the whole connection. The buffer lock orders the add against
            // the worker's extraction, so a second look at the flag
            // catches that interleaving; the nudge makes the worker flush.
            if self.shared.connected.load(Ordering::Acquire) {
                let _ = self.cmd_tx.send(Command::Flush);
            }
        }
    }

    /// Shuts the shipper down: cancels any pending retry, aborts an
    /// in-flight connect attempt, closes the live connection, and waits
    /// for the worker to exit. No notifications fire afterwards.
    pub async fn close(self) {
        let _ = self.cmd_tx.send(Command::Close);
        let _ = self.worker.await;
    }

    /// Entries currently held in the offline buffer.
    pub fn buffered_message_count(&self) -> usize {
        lock(&self.shared.buffer).len()
    }

    /// Entries overwritten in the offline buffer since the last drain.
    pub fn dropped_message_count(&self) -> u64 {
        lock(&self.shared.buffer).dropped_count()
    }

    /// Whether a connection is currently live.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// Subscribes to lifecycle notifications.
    ///
    /// May be called repeatedly; every subscriber sees every event emitted
    /// after its subscription.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ShipperEvent> {
        self.shared.events.subscribe()
    }
}

/// Builder for [`Shipper`].
pub struct ShipperBuilder<T, C> {
    config: ShipperConfig,
    connector: C,
    transform: Option<Transform<T>>,
    strategy: Option<Box<dyn RetryStrategy>>,
}

impl<T, C> ShipperBuilder<T, C>
where
    T: Serialize + Send + 'static,
{
    /// Applies `transform` to every entry before encoding. Default is
    /// identity.
    pub fn transform(mut self, transform: impl Fn(T) -> T + Send + 'static) -> Self {
        self.transform = Some(Box::new(transform));
        self
    }

    /// Replaces the retry policy named in the configuration with a custom
    /// one. The configured `retry_limit` does not apply to a custom
    /// policy; its own exhaustion rule governs.
    pub fn retry_strategy(mut self, strategy: impl RetryStrategy) -> Self {
        self.strategy = Some(Box::new(strategy));
        self
    }

    /// Replaces the TCP transport, mainly for tests.
    pub fn connector<C2: Connector>(self, connector: C2) -> ShipperBuilder<T, C2> {
        ShipperBuilder {
            config: self.config,
            connector,
            transform: self.transform,
            strategy: self.strategy,
        }
    }

    /// Validates the configuration and spawns the worker, which begins
    /// its first connect attempt immediately.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the
    /// configuration fails validation.
    pub fn build(self) -> Result<Shipper<T>>
    where
        C: Connector,
    {
        self.config.validate()?;

        let strategy = self
            .strategy
            .unwrap_or_else(|| self.config.backoff.build(self.config.retry_limit));

        let shared = Arc::new(Shared {
            buffer: Mutex::new(RingBuffer::new(self.config.offline_buffer)),
            connected: AtomicBool::new(false),
            events: EventFanout::default(),
        });

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let worker = Worker {
            shared: Arc::clone(&shared),
            cmd_rx,
            connector: self.connector,
            strategy,
            transform: self.transform,
            attempts: 0,
            connections: 0,
            pending_dropped: 0,
        };
        let handle = tokio::spawn(worker.run());

        Ok(Shipper {
            shared,
            cmd_tx,
            worker: handle,
        })
    }
}

#[derive(PartialEq)]
enum Flow {
    /// The link ended; consult the retry policy.
    Retry,
    /// Close was requested or every handle is gone; stop for good.
    Shutdown,
}

struct Worker<T, C: Connector> {
    shared: Arc<Shared<T>>,
    cmd_rx: mpsc::UnboundedReceiver<Command<T>>,
    connector: C,
    strategy: Box<dyn RetryStrategy>,
    transform: Option<Transform<T>>,
    /// Connect attempts since the last successful connection.
    attempts: u32,
    /// Successful connections over the worker's lifetime.
    connections: u64,
    /// Overwrite count awaiting its report, carried across a drain that
    /// the link died under.
    pending_dropped: u64,
}

impl<T, C> Worker<T, C>
where
    T: Serialize + Send + 'static,
    C: Connector,
{
    async fn run(mut self) {
        loop {
            if self.connect_once().await == Flow::Shutdown {
                return;
            }
            match self.strategy.next() {
                Some(delay) => {
                    self.shared.events.emit(ShipperEvent::Retry);
                    debug!(delay_ms = delay.as_millis() as u64, "reconnect scheduled");
                    if self.wait_for_retry(delay).await == Flow::Shutdown {
                        return;
                    }
                }
                None => {
                    warn!("retry budget exhausted, giving up on reconnection");
                    self.shared.events.emit(ShipperEvent::RetriesExhausted);
                    self.park().await;
                    return;
                }
            }
        }
    }

    /// One full pass through connecting and, if that succeeds, the
    /// connected phase. Returns when the link has ended either way.
    async fn connect_once(&mut self) -> Flow {
        self.attempts += 1;
        self.shared.events.emit(ShipperEvent::Connecting {
            attempt: self.attempts,
        });
        info!(attempt = self.attempts, "connecting to collector");

        // The connect future stays abortable: producer commands keep being
        // served while it is pending, and a close lands immediately.
        let (mut conn, mut closed) = {
            let connect = self.connector.connect();
            tokio::pin!(connect);
            loop {
                tokio::select! {
                    result = &mut connect => match result {
                        Ok(link) => break link,
                        Err(e) => {
                            warn!("connect failed: {}", e);
                            self.shared.events.emit(ShipperEvent::SocketError {
                                message: e.to_string(),
                            });
                            self.shared.events.emit(ShipperEvent::Disconnected);
                            return Flow::Retry;
                        }
                    },
                    cmd = self.cmd_rx.recv() => match cmd {
                        Some(Command::Write(entry)) => lock(&self.shared.buffer).add(entry),
                        Some(Command::Flush) => {}
                        Some(Command::Close) | None => return Flow::Shutdown,
                    },
                }
            }
        };

        self.attempts = 0;
        self.strategy.reset();
        self.connections += 1;
        self.shared.connected.store(true, Ordering::Release);
        self.shared.events.emit(ShipperEvent::Connected {
            connections: self.connections,
        });
        info!(connections = self.connections, "connected to collector");

        // Flush the outage backlog before touching the command queue, so
        // buffered entries always precede writes issued after reconnect.
        if !self.flush_backlog(&mut conn).await {
            return self.disconnected(conn).await;
        }

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Write(entry)) => match encode(&self.transform, entry) {
                        Ok(frame) => {
                            if let Err(e) = conn.send(frame).await {
                                warn!("send failed: {}", e);
                                self.shared.events.emit(ShipperEvent::SocketError {
                                    message: e.to_string(),
                                });
                                return self.disconnected(conn).await;
                            }
                        }
                        Err(e) => warn!("dropping unencodable entry: {}", e),
                    },
                    Some(Command::Flush) => {
                        if !self.flush_backlog(&mut conn).await {
                            return self.disconnected(conn).await;
                        }
                    }
                    Some(Command::Close) | None => {
                        self.shared.connected.store(false, Ordering::Release);
                        conn.shutdown().await;
                        return Flow::Shutdown;
                    }
                },
                _ = &mut closed => {
                    debug!("link closed by peer or transport");
                    return self.disconnected(conn).await;
                }
            }
        }
    }

    /// Sends everything currently buffered through the connection, oldest
    /// first, then reports the outstanding overwrite count. Returns false
    /// if the link broke under the flush.
    ///
    /// The drop report goes out only once the whole backlog is delivered;
    /// if the link dies mid-flush the count is carried to the next
    /// successful flush instead of being reported for entries that just
    /// went back into the buffer.
    async fn flush_backlog(&mut self, conn: &mut C::Conn) -> bool {
        let entries = {
            let mut buffer = lock(&self.shared.buffer);
            self.pending_dropped += buffer.dropped_count();
            let mut entries = Vec::with_capacity(buffer.len());
            buffer.drain(|entry| entries.push(entry));
            entries
        };
        if !entries.is_empty() {
            debug!(count = entries.len(), "draining offline buffer");
        }

        let mut broken = false;
        let mut backlog = entries.into_iter();
        for entry in backlog.by_ref() {
            match encode(&self.transform, entry) {
                Ok(frame) => {
                    if let Err(e) = conn.send(frame).await {
                        warn!("send failed while draining: {}", e);
                        self.shared.events.emit(ShipperEvent::SocketError {
                            message: e.to_string(),
                        });
                        broken = true;
                        break;
                    }
                }
                Err(e) => warn!("dropping unencodable buffered entry: {}", e),
            }
        }
        if broken {
            // The entry handed to the failing send is lost; the rest of
            // the backlog goes back in front of any writes still queued
            // behind the command channel.
            let mut buffer = lock(&self.shared.buffer);
            for entry in backlog {
                buffer.add(entry);
            }
            return false;
        }

        if self.pending_dropped > 0 {
            self.shared.events.emit(ShipperEvent::DroppedMessages {
                count: self.pending_dropped,
            });
            self.pending_dropped = 0;
        }
        true
    }

    /// Releases a dead or dying connection and reports the closure,
    /// exactly once per link.
    async fn disconnected(&mut self, mut conn: C::Conn) -> Flow {
        self.shared.connected.store(false, Ordering::Release);
        conn.shutdown().await;
        drop(conn);
        info!("disconnected from collector");
        self.shared.events.emit(ShipperEvent::Disconnected);
        Flow::Retry
    }

    /// Sleeps out the backoff delay while still serving producer writes.
    async fn wait_for_retry(&mut self, delay: Duration) -> Flow {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return Flow::Retry,
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Write(entry)) => lock(&self.shared.buffer).add(entry),
                    Some(Command::Flush) => {}
                    Some(Command::Close) | None => return Flow::Shutdown,
                },
            }
        }
    }

    /// Terminal state after retry exhaustion: no reconnects, but writes
    /// keep buffering and the counters stay inspectable until close.
    async fn park(&mut self) {
        loop {
            match self.cmd_rx.recv().await {
                Some(Command::Write(entry)) => lock(&self.shared.buffer).add(entry),
                Some(Command::Flush) => {}
                Some(Command::Close) | None => return,
            }
        }
    }
}

/// Applies the optional transform and encodes one entry as a
/// newline-terminated JSON frame.
fn encode<T: Serialize>(transform: &Option<Transform<T>>, entry: T) -> Result<Bytes> {
    let entry = match transform {
        Some(f) => f(entry),
        None => entry,
    };
    let mut frame = serde_json::to_vec(&entry)?;
    frame.push(b'\n');
    Ok(Bytes::from(frame))
}
