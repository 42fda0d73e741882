//! Transport capability consumed by the shipper.
//!
//! The shipper never touches sockets directly; it talks to a [`Connector`]
//! that opens point-to-point links and a [`Connection`] that carries
//! encoded frames. [`TcpConnector`] is the production implementation;
//! tests substitute an in-memory one.
//!
//! Every link must resolve its [`ClosedSignal`] exactly once when it ends,
//! whether the peer closed gracefully or the socket errored. The shipper's
//! reconnect logic is driven by that single signal; transport errors are
//! reported but never trigger reconnection on their own.

use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tracing::debug;

/// Resolves (with `Err`, its sender having been dropped) once the link has
/// ended for any reason.
pub type ClosedSignal = oneshot::Receiver<()>;

/// Opens point-to-point links to the collector.
#[async_trait]
pub trait Connector: Send + 'static {
    type Conn: Connection;

    /// Opens a new link, returning the write handle and the signal that
    /// resolves when the link ends.
    async fn connect(&mut self) -> io::Result<(Self::Conn, ClosedSignal)>;
}

/// Write side of an open link.
#[async_trait]
pub trait Connection: Send + 'static {
    /// Writes one encoded frame to the peer.
    async fn send(&mut self, frame: Bytes) -> io::Result<()>;

    /// Closes the link deliberately.
    async fn shutdown(&mut self);
}

/// TCP implementation of [`Connector`].
///
/// The read half of each stream is watched by a detached task whose only
/// job is to observe the close; detached tasks do not keep the process
/// alive, so an idle shipper never pins a shutdown on its socket.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    address: String,
}

impl TcpConnector {
    pub fn new(address: String) -> Self {
        Self { address }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Conn = TcpConnection;

    async fn connect(&mut self) -> io::Result<(TcpConnection, ClosedSignal)> {
        let stream = TcpStream::connect(&self.address).await?;
        let (mut reader, writer) = stream.into_split();

        let (closed_tx, closed_rx) = oneshot::channel();
        let watcher = tokio::spawn(async move {
            // Incoming bytes are discarded; the collector is write-only
            // from our side. EOF or a read error both mean the link ended,
            // and dropping closed_tx delivers that uniformly.
            let _guard = closed_tx;
            let mut scratch = [0u8; 1024];
            loop {
                match reader.read(&mut scratch).await {
                    Ok(0) => {
                        debug!("peer closed connection");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        debug!("connection read failed: {}", e);
                        break;
                    }
                }
            }
        });

        let connection = TcpConnection { writer, watcher };
        Ok((connection, closed_rx))
    }
}

/// Write half of an established TCP link.
pub struct TcpConnection {
    writer: OwnedWriteHalf,
    watcher: tokio::task::JoinHandle<()>,
}

#[async_trait]
impl Connection for TcpConnection {
    async fn send(&mut self, frame: Bytes) -> io::Result<()> {
        self.writer.write_all(&frame).await?;
        self.writer.flush().await
    }

    async fn shutdown(&mut self) {
        let _ = self.writer.shutdown().await;
        self.watcher.abort();
    }
}
