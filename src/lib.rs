//! Resilient transport for structured log records.
//!
//! A [`Shipper`] accepts a stream of entries from a producer and delivers
//! each one, newline-delimited JSON encoded, to a remote collector over a
//! persistent TCP connection. While the connection is down, entries are
//! held in a bounded ring buffer that overwrites its oldest entries under
//! sustained outage; reconnection is driven by a pluggable backoff policy
//! and the backlog is flushed in order once the link comes back.

pub mod buffer;
pub mod config;
pub mod error;
pub mod event;
pub mod retry;
pub mod shipper;
pub mod transport;

pub use buffer::RingBuffer;
pub use config::{BackoffConfig, ShipperConfig};
pub use error::{Error, Result};
pub use event::ShipperEvent;
pub use retry::{ExponentialBackoff, FibonacciBackoff, RetryStrategy};
pub use shipper::{Shipper, ShipperBuilder};
pub use transport::{ClosedSignal, Connection, Connector, TcpConnector};
