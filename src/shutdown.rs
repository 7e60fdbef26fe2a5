//! Graceful shutdown: stop accepting calls, wait for queued and running
//! safe-calls to drain, then stop the worker pools.

use std::time::{Duration, Instant};

use crate::safecall::{CallKey, SafeCallManager};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Result of a shutdown operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownResult {
    Complete,
    /// Calls still queued, claimed or running when the timeout elapsed.
    Timeout { remaining: usize },
}

/// Block until `manager` has nothing queued, claimed or running.
pub fn wait_for_drain<K: CallKey>(manager: &SafeCallManager<K>, timeout: Duration) -> ShutdownResult {
    let deadline = Instant::now() + timeout;

    loop {
        let pending = manager.pending_count();
        if pending == 0 {
            return ShutdownResult::Complete;
        }

        let remaining_time = deadline.saturating_duration_since(Instant::now());
        if remaining_time.is_zero() {
            return ShutdownResult::Timeout { remaining: pending };
        }

        std::thread::sleep(POLL_INTERVAL.min(remaining_time));
    }
}
