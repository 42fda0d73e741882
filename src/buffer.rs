//! Bounded overwrite buffer for entries produced while offline.
//!
//! The buffer keeps the most recent `capacity` entries. Overflow is not an
//! error: the oldest resident entry is evicted and counted, and the count
//! is reported alongside the next drain so monitoring code can see how
//! much was lost during an outage.

use std::collections::VecDeque;

/// Fixed-capacity ring buffer with oldest-entry eviction.
///
/// Two counters ride along: `dropped` tracks evictions since the last
/// [`drain`](Self::drain) and is reset by it, while `total_added` counts
/// every [`add`](Self::add) over the buffer's whole lifetime and is never
/// reset.
#[derive(Debug)]
pub struct RingBuffer<T> {
    capacity: usize,
    slots: VecDeque<T>,
    total_added: u64,
    dropped: u64,
}

impl<T> RingBuffer<T> {
    /// Creates an empty buffer holding at most `capacity` entries.
    ///
    /// Capacity is validated upstream by
    /// [`ShipperConfig::validate`](crate::ShipperConfig::validate).
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0, "ring buffer capacity must be positive");
        Self {
            capacity,
            slots: VecDeque::with_capacity(capacity),
            total_added: 0,
            dropped: 0,
        }
    }

    /// Appends an entry, evicting the oldest resident entry when full.
    ///
    /// Always succeeds; eviction is the intended degradation mode, not a
    /// failure.
    pub fn add(&mut self, entry: T) {
        self.total_added += 1;
        if self.slots.len() == self.capacity {
            self.slots.pop_front();
            self.dropped += 1;
        }
        self.slots.push_back(entry);
    }

    /// Number of entries currently resident, at most `capacity`.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Entries evicted since the last drain.
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }

    /// Entries added over the buffer's lifetime, across drains.
    pub fn total_added(&self) -> u64 {
        self.total_added
    }

    /// Visits every resident entry oldest-first, emptying the buffer and
    /// resetting the dropped counter.
    ///
    /// `total_added` keeps accumulating; a drain starts a new drop-counting
    /// epoch, not a new buffer. Draining an empty buffer visits nothing.
    pub fn drain(&mut self, mut visit: impl FnMut(T)) {
        while let Some(entry) = self.slots.pop_front() {
            visit(entry);
        }
        self.dropped = 0;
    }
}
