//! Engine configuration.
//!
//! Centralizes the knobs the teacher hard-coded inline (buffer sizes, poll
//! intervals) the way `ConnectionConfig` in the original agent centralizes
//! reconnect timing.

use std::time::Duration;

/// Number of backfill lines delivered to a subscriber at attach time,
/// fixed at 10 by the specification to preserve observable behavior.
pub const DEFAULT_BACKFILL_LINES: usize = 10;

const DEFAULT_WATCH_POLL_INTERVAL: Duration = Duration::from_millis(200);
const DEFAULT_READ_BLOCK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Lines delivered at attach time and to late joiners.
    pub backfill_lines: usize,
    /// Poll interval used by `notify`'s internal fallback and by the
    /// engine's own polling watcher when native notification is
    /// unavailable or disabled.
    pub watch_poll_interval: Duration,
    /// Block size used by the reader's backward scan in `last_lines`.
    pub read_block_size: usize,
    /// When true, a failure to construct a native `notify` watcher is
    /// reported as `WatchUnavailable` instead of falling back to polling.
    pub force_native_watcher: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backfill_lines: DEFAULT_BACKFILL_LINES,
            watch_poll_interval: DEFAULT_WATCH_POLL_INTERVAL,
            read_block_size: DEFAULT_READ_BLOCK_SIZE,
            force_native_watcher: false,
        }
    }
}

impl EngineConfig {
    pub fn with_backfill_lines(mut self, n: usize) -> Self {
        self.backfill_lines = n;
        self
    }
}
