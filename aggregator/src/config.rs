//! Process-wide configuration, built from CLI flags (ambient; external to the
//! wire protocol itself).

use std::path::PathBuf;
use std::time::Duration;

/// Default soft-expiry window for producer liveness (spec §4.6): a producer
/// silent for longer than this is treated as not contributing data. Lives on
/// [`Config`] rather than as a bare constant so tests can shrink it instead
/// of sleeping past the real 30s window.
pub const DEFAULT_EXPIRY_WINDOW: Duration = Duration::from_millis(30_000);

/// Bounded poll timeout the acceptor uses when waiting on `accept` (spec §5).
pub const ACCEPT_POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Bounded poll timeout the worker uses when waiting on the hand-off queue
/// (spec §5).
pub const WORKER_QUEUE_POLL_TIMEOUT: Duration = Duration::from_secs(2);

/// Per-connection read timeout, left open by the spec and decided here to
/// avoid slow-loris starvation of the single worker (spec §5).
pub const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the bounded hand-off queue between the acceptor and the
/// worker (spec §4.4).
pub const QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct Config {
    /// TCP port the aggregator listens on.
    pub port: u16,
    /// Path of the checkpoint file (spec §6).
    pub checkpoint_path: PathBuf,
    /// Interval between checkpoint snapshots (spec §4.7).
    pub checkpoint_interval: Duration,
    /// Soft-expiry window for producer liveness (spec §4.6).
    pub expiry_window: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 4567,
            checkpoint_path: PathBuf::from("data.json"),
            checkpoint_interval: Duration::from_secs(15),
            expiry_window: DEFAULT_EXPIRY_WINDOW,
        }
    }
}
