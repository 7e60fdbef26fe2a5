//! Tracking wrapper: the unit of work handed to the worker pool.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::invocation::{CallKey, Invocation};
use super::manager::{SafeCallManager, StartOutcome};
use crate::telemetry::{self, InvocationSpan, SpanExt};

/// Result of running a wrapper.
#[derive(Debug)]
pub enum RunOutcome<K: CallKey> {
    /// The work ran to completion.
    Completed,
    /// The work panicked. The registry has still been cleared.
    Panicked,
    /// Another call was active; the invocation has been queued instead.
    Rejected { running: Arc<TrackingWrapper<K>> },
}

struct Execution {
    thread_name: Option<String>,
    started_at: Instant,
}

/// Executes one invocation and reports start and end to the manager.
pub struct TrackingWrapper<K: CallKey> {
    invocation: Arc<Invocation<K>>,
    execution: Mutex<Option<Execution>>,
}

impl<K: CallKey> TrackingWrapper<K> {
    pub fn new(invocation: Arc<Invocation<K>>) -> Arc<Self> {
        Arc::new(Self {
            invocation,
            execution: Mutex::new(None),
        })
    }

    pub fn invocation(&self) -> &Arc<Invocation<K>> {
        &self.invocation
    }

    /// Whether the work is executing right now.
    pub fn is_running(&self) -> bool {
        self.execution.lock().is_some()
    }

    /// Name of the thread executing the work, if it is running.
    pub fn thread_name(&self) -> Option<String> {
        self.execution.lock().as_ref().and_then(|e| e.thread_name.clone())
    }

    /// How long the work has been executing, if it is running.
    pub fn running_for(&self) -> Option<Duration> {
        self.execution.lock().as_ref().map(|e| e.started_at.elapsed())
    }

    /// Ask the work to stop by cancelling the invocation's token.
    ///
    /// Advisory only: work that never checks the token runs to completion.
    pub fn interrupt(&self) {
        self.invocation.cancellation().cancel();
    }

    /// Register with the manager, execute the work, then unregister.
    pub fn run(self: &Arc<Self>, manager: &Arc<SafeCallManager<K>>) -> RunOutcome<K> {
        if let StartOutcome::Rejected { running } = manager.record_call_start(&self.invocation, self) {
            return RunOutcome::Rejected { running };
        }

        let span = InvocationSpan::new(
            self.invocation.id(),
            self.invocation.identifier(),
            self.invocation.kind(),
        );
        let _enter = span.enter();

        *self.execution.lock() = Some(Execution {
            thread_name: std::thread::current().name().map(str::to_string),
            started_at: Instant::now(),
        });

        let result = match self.invocation.take_work() {
            Some(work) => catch_unwind(AssertUnwindSafe(|| work(self.invocation.cancellation())))
                .map_err(|payload| panic_message(payload.as_ref())),
            None => {
                tracing::warn!(invocation = %self.invocation.id(), "invocation has already been executed");
                Ok(())
            }
        };

        let elapsed = self.running_for().unwrap_or_default();
        *self.execution.lock() = None;

        span.record("elapsed_ms", elapsed.as_millis() as u64);
        span.record_result(&result);
        telemetry::record_call_latency(self.invocation.kind(), elapsed);

        let outcome = match result {
            Ok(()) => RunOutcome::Completed,
            Err(message) => {
                tracing::error!(
                    invocation = %self.invocation.id(),
                    identifier = ?self.invocation.identifier(),
                    panic = %message,
                    "safe-call work panicked"
                );
                manager.record_panic();
                RunOutcome::Panicked
            }
        };

        manager.record_call_end(&self.invocation, self);
        outcome
    }
}

impl<K: CallKey> fmt::Debug for TrackingWrapper<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackingWrapper")
            .field("invocation", &self.invocation.id())
            .field("identifier", self.invocation.identifier())
            .field("thread", &self.thread_name())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
