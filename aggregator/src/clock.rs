//! Lamport logical clock (spec §4.2).
//!
//! All three operations are mutually exclusive with each other via a single
//! critical section; there's exactly one clock per aggregator process, and
//! the worker task is its only mutator (the checkpointer only reads it).

use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct LamportClock {
    value: Mutex<u64>,
}

impl LamportClock {
    pub fn new() -> Self {
        Self {
            value: Mutex::new(0),
        }
    }

    /// Restores a clock value from a checkpoint (spec invariant 5).
    pub fn with_value(value: u64) -> Self {
        Self {
            value: Mutex::new(value),
        }
    }

    /// Increments the clock and returns the new value. The handshake line
    /// uses `current`, not this; `tick_send` is for outbound messages that
    /// should themselves advance the clock.
    pub fn tick_send(&self) -> u64 {
        let mut value = self.value.lock();
        *value += 1;
        *value
    }

    /// `L <- max(L, remote) + 1`. Invoked once per received request body,
    /// after header parse and before handler logic (spec §4.2).
    pub fn observe(&self, remote: u64) -> u64 {
        let mut value = self.value.lock();
        *value = (*value).max(remote) + 1;
        *value
    }

    /// Reads the current value without mutating it. This is what the
    /// handshake line advertises (spec §4.2: the handshake does not tick).
    pub fn current(&self) -> u64 {
        *self.value.lock()
    }
}
