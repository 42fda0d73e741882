//! Reconnect backoff policies.
//!
//! A [`RetryStrategy`] produces the delay to wait before each reconnect
//! attempt and reports exhaustion once its attempt ceiling is reached.
//! Two deterministic built-ins are provided, [`FibonacciBackoff`] and
//! [`ExponentialBackoff`]; callers may substitute any implementation of
//! the trait through the shipper builder.

use std::cmp;
use std::time::Duration;

/// Policy producing successive reconnect delays.
pub trait RetryStrategy: Send + 'static {
    /// Advances the attempt counter and returns the delay to wait before
    /// the next attempt, or `None` once the policy is exhausted.
    ///
    /// Exhaustion is sticky: after the first `None`, every subsequent call
    /// returns `None` until [`reset`](Self::reset).
    fn next(&mut self) -> Option<Duration>;

    /// Restores the initial delay and attempt count, called after a
    /// successful connect.
    fn reset(&mut self);
}

impl RetryStrategy for Box<dyn RetryStrategy> {
    fn next(&mut self) -> Option<Duration> {
        (**self).next()
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// Delays growing along the Fibonacci sequence scaled by the initial
/// delay: `d, 2d, 3d, 5d, 8d, ...`, capped at the maximum delay.
///
/// No randomization, so test runs are reproducible.
#[derive(Debug)]
pub struct FibonacciBackoff {
    initial: Duration,
    max: Duration,
    max_attempts: u32,
    prev: Duration,
    current: Duration,
    attempts: u32,
}

impl FibonacciBackoff {
    pub fn new(initial: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            initial,
            max,
            max_attempts,
            prev: initial,
            current: initial,
            attempts: 0,
        }
    }
}

impl RetryStrategy for FibonacciBackoff {
    fn next(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        let delay = self.current;
        let following = cmp::min(self.prev + self.current, self.max);
        self.prev = self.current;
        self.current = following;
        Some(delay)
    }

    fn reset(&mut self) {
        self.prev = self.initial;
        self.current = self.initial;
        self.attempts = 0;
    }
}

/// Delays doubling each attempt: `d, 2d, 4d, 8d, ...`, capped at the
/// maximum delay. No randomization.
#[derive(Debug)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    max_attempts: u32,
    current: Duration,
    attempts: u32,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            initial,
            max,
            max_attempts,
            current: initial,
            attempts: 0,
        }
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn next(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        let delay = self.current;
        self.current = cmp::min(self.current * 2, self.max);
        Some(delay)
    }

    fn reset(&mut self) {
        self.current = self.initial;
        self.attempts = 0;
    }
}
