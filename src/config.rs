use crate::retry::{ExponentialBackoff, FibonacciBackoff, RetryStrategy};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Construction configuration for a [`Shipper`](crate::Shipper).
///
/// `server` and `port` are required; everything else carries a default.
/// Misconfiguration is rejected synchronously by [`validate`](Self::validate)
/// when the shipper is built, never silently defaulted.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShipperConfig {
    /// Collector hostname or address.
    pub server: String,
    /// Collector TCP port.
    pub port: u16,
    /// Capacity of the offline ring buffer.
    #[serde(default = "default_offline_buffer")]
    pub offline_buffer: usize,
    /// Backoff policy used between reconnect attempts.
    #[serde(default)]
    pub backoff: BackoffConfig,
    /// Reconnect attempts before giving up for good.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
}

/// Named backoff policy with its delay bounds, in milliseconds.
///
/// An unrecognized `name` fails at deserialization time. Callers that need
/// a policy outside these two supply their own [`RetryStrategy`] through
/// the shipper builder instead.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum BackoffConfig {
    Fibonacci {
        #[serde(default = "default_init_delay_ms")]
        init_delay_ms: u64,
        #[serde(default = "default_max_delay_ms")]
        max_delay_ms: u64,
    },
    Exponential {
        #[serde(default = "default_init_delay_ms")]
        init_delay_ms: u64,
        #[serde(default = "default_max_delay_ms")]
        max_delay_ms: u64,
    },
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig::Fibonacci {
            init_delay_ms: default_init_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl ShipperConfig {
    /// Creates a configuration with the given collector address and the
    /// default buffer, backoff, and retry settings.
    pub fn new(server: impl Into<String>, port: u16) -> Self {
        Self {
            server: server.into(),
            port,
            offline_buffer: default_offline_buffer(),
            backoff: BackoffConfig::default(),
            retry_limit: default_retry_limit(),
        }
    }

    /// Checks the configuration for values that would make the shipper
    /// inoperable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the server is empty, the port is zero,
    /// or the offline buffer capacity is zero.
    pub fn validate(&self) -> Result<()> {
        if self.server.is_empty() {
            return Err(Error::Config("server must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(Error::Config("port must not be zero".to_string()));
        }
        if self.offline_buffer == 0 {
            return Err(Error::Config(
                "offline_buffer capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// `host:port` form of the collector address.
    pub fn address(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }
}

impl BackoffConfig {
    /// Builds the boxed built-in strategy this configuration names.
    ///
    /// `retry_limit` is the number of delays handed out before the
    /// strategy reports exhaustion.
    pub fn build(&self, retry_limit: u32) -> Box<dyn RetryStrategy> {
        match *self {
            BackoffConfig::Fibonacci {
                init_delay_ms,
                max_delay_ms,
            } => Box::new(FibonacciBackoff::new(
                Duration::from_millis(init_delay_ms),
                Duration::from_millis(max_delay_ms),
                retry_limit,
            )),
            BackoffConfig::Exponential {
                init_delay_ms,
                max_delay_ms,
            } => Box::new(ExponentialBackoff::new(
                Duration::from_millis(init_delay_ms),
                Duration::from_millis(max_delay_ms),
                retry_limit,
            )),
        }
    }
}

fn default_offline_buffer() -> usize {
    100
}

fn default_retry_limit() -> u32 {
    10
}

fn default_init_delay_ms() -> u64 {
    300
}

fn default_max_delay_ms() -> u64 {
    10_000
}
