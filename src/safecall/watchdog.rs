//! Timeout watchdog for asynchronous safe-calls.
//!
//! A watcher is armed when an async invocation starts. When it fires, the
//! owner is notified only if the invocation is still the one claimed for its
//! identifier and some wrapper is active. The call itself is never cancelled
//! here; the owner decides whether to interrupt it.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::invocation::{CallKey, Invocation, InvocationId};
use super::manager::SafeCallManager;
use crate::telemetry;

impl<K: CallKey> SafeCallManager<K> {
    pub(super) fn watch(self: &Arc<Self>, invocation: &Arc<Invocation<K>>) {
        let manager = Arc::downgrade(self);
        let watched = Arc::clone(invocation);
        let handle = self.watchdog.schedule(
            invocation.timeout(),
            Box::new(move || {
                if let Some(manager) = manager.upgrade() {
                    manager.handle_potential_timeout(&watched);
                }
            }),
        );
        self.watchers.lock().insert(invocation.id(), handle);
        tracing::trace!(
            invocation = %invocation.id(),
            timeout_ms = invocation.timeout().as_millis() as u64,
            "scheduled timeout watcher"
        );
    }

    pub(super) fn unwatch(&self, id: InvocationId) {
        if let Some(handle) = self.watchers.lock().remove(&id) {
            handle.cancel();
        }
    }

    /// Number of armed watchers that have neither fired nor been cancelled.
    pub fn armed_watchers(&self) -> usize {
        self.watchers.lock().len()
    }

    pub(crate) fn handle_potential_timeout(&self, invocation: &Invocation<K>) {
        self.watchers.lock().remove(&invocation.id());

        let identifier = invocation.identifier();
        let still_claimed = self
            .claimed
            .lock()
            .get(identifier)
            .is_some_and(|current| current.id() == invocation.id());
        if !still_claimed {
            self.counters.stale_timeouts.fetch_add(1, Ordering::Relaxed);
            telemetry::record_stale_timeout();
            tracing::trace!(invocation = %invocation.id(), "ignoring stale timeout");
            return;
        }

        let active = self.active.lock().get(identifier).cloned();
        if let Some(active) = active {
            self.notify_timeout(invocation, &active);
        }
    }
}
