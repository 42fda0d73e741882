//! Lifecycle notifications emitted by the shipper.
//!
//! Events are advisory: monitoring code subscribes to observe connection
//! health and loss counts, but nothing in the delivery path depends on
//! anyone listening. Emission never blocks.

use std::sync::Mutex;
use tokio::sync::mpsc;

/// A connection-lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShipperEvent {
    /// A connect attempt is starting; `attempt` counts attempts since the
    /// last successful connection.
    Connecting { attempt: u32 },
    /// A connection was established; `connections` counts successful
    /// connections over the shipper's lifetime.
    Connected { connections: u64 },
    /// The link closed, gracefully or not. Emitted exactly once per
    /// closure, including failed connect attempts.
    Disconnected,
    /// A reconnect attempt has been scheduled.
    Retry,
    /// A transport-level error. Informational only; reconnection is driven
    /// by the close signal, not by this event.
    SocketError { message: String },
    /// Entries were overwritten in the offline buffer during the outage
    /// that just ended. Emitted after the post-reconnect drain.
    DroppedMessages { count: u64 },
    /// The retry policy gave up; no further reconnect attempts will be
    /// made by this instance.
    RetriesExhausted,
}

/// Subscriber list the worker emits on.
///
/// Senders are unbounded so emission can happen from the producer path
/// and the worker alike without blocking; subscribers that have gone away
/// are pruned on the next emit.
#[derive(Debug, Default)]
pub(crate) struct EventFanout {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ShipperEvent>>>,
}

impl EventFanout {
    pub(crate) fn subscribe(&self) -> mpsc::UnboundedReceiver<ShipperEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(tx);
        rx
    }

    pub(crate) fn emit(&self, event: ShipperEvent) {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fans_out_to_every_subscriber() {
        let fanout = EventFanout::default();
        let mut first = fanout.subscribe();
        let mut second = fanout.subscribe();

        fanout.emit(ShipperEvent::Retry);

        assert_eq!(first.recv().await, Some(ShipperEvent::Retry));
        assert_eq!(second.recv().await, Some(ShipperEvent::Retry));
    }

    #[test]
    fn emit_without_subscribers_is_fine() {
        let fanout = EventFanout::default();
        fanout.emit(ShipperEvent::Disconnected);
    }

    #[tokio::test]
    async fn dropped_subscribers_are_pruned() {
        let fanout = EventFanout::default();
        let first = fanout.subscribe();
        let mut second = fanout.subscribe();
        drop(first);

        fanout.emit(ShipperEvent::Connecting { attempt: 1 });
        fanout.emit(ShipperEvent::Disconnected);

        assert_eq!(
            second.recv().await,
            Some(ShipperEvent::Connecting { attempt: 1 })
        );
        assert_eq!(second.recv().await, Some(ShipperEvent::Disconnected));
    }
}
