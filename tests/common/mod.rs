//! In-memory transport for exercising the shipper without a network.
//!
//! A [`MockNet`] scripts the outcome of successive connect attempts and
//! records every frame the shipper sends; the paired [`MockConnector`] is
//! handed to the shipper builder. Link closure and send failures are
//! triggered from the test body.

use async_trait::async_trait;
use bytes::Bytes;
use log_shipper::{ClosedSignal, Connection, Connector};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Routes shipper tracing to the test output.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("log_shipper=debug")
        .try_init()
        .ok();
}

#[derive(Default)]
struct MockNetInner {
    sent: Vec<String>,
    connect_attempts: usize,
    fail_next_send: bool,
    close_tx: Option<oneshot::Sender<()>>,
}

/// Test-side controller for the mock transport.
#[derive(Clone)]
pub struct MockNet {
    outcomes: mpsc::UnboundedSender<io::Result<()>>,
    inner: Arc<Mutex<MockNetInner>>,
}

/// Builds a connected controller/connector pair.
///
/// Connect attempts block until the controller scripts an outcome, so a
/// test can hold the shipper in the connecting state for as long as it
/// needs.
pub fn pair() -> (MockNet, MockConnector) {
    let (tx, rx) = mpsc::unbounded_channel();
    let inner = Arc::new(Mutex::new(MockNetInner::default()));
    let net = MockNet {
        outcomes: tx,
        inner: Arc::clone(&inner),
    };
    let connector = MockConnector { outcomes: rx, inner };
    (net, connector)
}

fn lock(inner: &Mutex<MockNetInner>) -> MutexGuard<'_, MockNetInner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockNet {
    /// Lets the next pending or future connect attempt succeed.
    pub fn allow_connect(&self) {
        let _ = self.outcomes.send(Ok(()));
    }

    /// Makes the next pending or future connect attempt fail.
    pub fn refuse_connect(&self) {
        let _ = self
            .outcomes
            .send(Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused")));
    }

    /// Closes the live link from the far side.
    pub fn close_link(&self) {
        if let Some(tx) = lock(&self.inner).close_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Makes the next send on the live link fail with a broken pipe.
    pub fn fail_next_send(&self) {
        lock(&self.inner).fail_next_send = true;
    }

    /// Frames delivered so far, as UTF-8 lines.
    pub fn sent(&self) -> Vec<String> {
        lock(&self.inner).sent.clone()
    }

    /// Connect attempts observed so far, successful or not.
    pub fn connect_attempts(&self) -> usize {
        lock(&self.inner).connect_attempts
    }

    /// Polls until at least `n` frames have been delivered.
    pub async fn wait_for_sent(&self, n: usize) -> Vec<String> {
        loop {
            let sent = self.sent();
            if sent.len() >= n {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

/// Scripted [`Connector`] for tests.
pub struct MockConnector {
    outcomes: mpsc::UnboundedReceiver<io::Result<()>>,
    inner: Arc<Mutex<MockNetInner>>,
}

#[async_trait]
impl Connector for MockConnector {
    type Conn = MockConnection;

    async fn connect(&mut self) -> io::Result<(MockConnection, ClosedSignal)> {
        lock(&self.inner).connect_attempts += 1;
        match self.outcomes.recv().await {
            Some(Ok(())) => {
                let (close_tx, close_rx) = oneshot::channel();
                lock(&self.inner).close_tx = Some(close_tx);
                let connection = MockConnection {
                    inner: Arc::clone(&self.inner),
                };
                Ok((connection, close_rx))
            }
            Some(Err(e)) => Err(e),
            None => Err(io::Error::new(io::ErrorKind::Other, "mock net gone")),
        }
    }
}

pub struct MockConnection {
    inner: Arc<Mutex<MockNetInner>>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn send(&mut self, frame: Bytes) -> io::Result<()> {
        let mut inner = lock(&self.inner);
        if inner.fail_next_send {
            inner.fail_next_send = false;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"));
        }
        inner
            .sent
            .push(String::from_utf8_lossy(&frame).into_owned());
        Ok(())
    }

    async fn shutdown(&mut self) {
        lock(&self.inner).close_tx = None;
    }
}
