//! Error types and result handling for log-shipper.
//!
//! This module defines the main error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! Note that the producer-facing write path is deliberately infallible:
//! delivery failures surface asynchronously as [`ShipperEvent`]
//! notifications, never as errors returned to the producer. [`Error`] is
//! only produced at construction time and on internal I/O paths.
//!
//! [`ShipperEvent`]: crate::ShipperEvent
//!
//! # Example
//!
//! ```rust
//! use log_shipper::{Error, Result, ShipperConfig};
//!
//! fn load() -> Result<ShipperConfig> {
//!     let config = ShipperConfig::new("", 514);
//!     config.validate()?; // empty server is rejected here
//!     Ok(config)
//! }
//!
//! match load() {
//!     Ok(_) => println!("configured"),
//!     Err(Error::Config(msg)) => eprintln!("Configuration error: {}", msg),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use thiserror::Error;

/// The main error type for log-shipper operations.
///
/// Transport-level I/O failures never appear here: they stay `io::Result`
/// inside the [`Connector`](crate::Connector) seam and surface to callers
/// as [`ShipperEvent::SocketError`](crate::ShipperEvent::SocketError)
/// notifications.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error: missing or invalid construction options.
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization error when encoding an entry for the wire.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A convenient Result type alias for log-shipper operations.
///
/// This is equivalent to `std::result::Result<T, log_shipper::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
