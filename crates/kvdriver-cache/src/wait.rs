//! Bounded visibility wait.
//!
//! Writes to the cache are applied by its background worker after they are
//! buffered, so a key is not readable the moment `insert` returns. The
//! adapter polls until the key reaches the expected state, up to a deadline.

use std::thread;
use std::time::{Duration, Instant};

use kvdriver_core::{Error, Result};

/// Interval between two visibility probes.
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Polls a probe at a fixed interval until it holds or the deadline passes.
#[derive(Debug, Clone, Copy)]
pub struct VisibilityWaiter {
    interval: Duration,
    timeout: Duration,
}

impl VisibilityWaiter {
    /// Create a waiter giving up after `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self {
            interval: POLL_INTERVAL,
            timeout,
        }
    }

    /// Use a different probe interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Upper bound of one wait
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Blocks until `probe` returns `true`.
    ///
    /// The probe runs at least once, even with a zero timeout. Fails with
    /// [`Error::VisibilityTimeout`] once the deadline has passed.
    pub fn wait_until(&self, mut probe: impl FnMut() -> bool) -> Result<()> {
        let start = Instant::now();
        loop {
            if probe() {
                return Ok(());
            }
            let waited = start.elapsed();
            if waited >= self.timeout {
                return Err(Error::VisibilityTimeout { waited });
            }
            thread::sleep(self.interval.min(self.timeout - waited));
        }
    }
}
