//! One-shot delayed callbacks for timeout watchdogs.
//!
//! Timers run on a tokio runtime that is independent of the worker pool, so a
//! saturated pool can never delay a watchdog.

use std::time::Duration;

use thiserror::Error;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio_util::sync::CancellationToken;

/// Callback fired when a timer elapses.
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Error)]
pub enum TimerError {
    #[error("Failed to build timer runtime: {0}")]
    RuntimeBuild(String),
    #[error("No tokio runtime available on this thread")]
    NoRuntime,
}

/// Cancellable handle to a scheduled callback.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Prevent the callback from firing. No effect once it has fired.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Schedules callbacks to fire once, no earlier than a given delay.
pub trait DelayScheduler: Send + Sync {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;
}

/// [`DelayScheduler`] backed by tokio timers.
pub struct TokioDelayScheduler {
    handle: Handle,
    /// Present when this scheduler owns its runtime.
    runtime: Option<Runtime>,
}

impl TokioDelayScheduler {
    /// Start a dedicated single-worker runtime whose thread is named `thread_name`.
    pub fn dedicated(thread_name: &str) -> Result<Self, TimerError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name(thread_name)
            .enable_time()
            .build()
            .map_err(|e| TimerError::RuntimeBuild(e.to_string()))?;
        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
        })
    }

    /// Use an existing runtime.
    pub fn with_handle(handle: Handle) -> Self {
        Self { handle, runtime: None }
    }

    /// Use the runtime the caller is currently running on.
    pub fn current() -> Result<Self, TimerError> {
        Handle::try_current()
            .map(Self::with_handle)
            .map_err(|_| TimerError::NoRuntime)
    }
}

impl DelayScheduler for TokioDelayScheduler {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        self.handle.spawn(async move {
            let fired = tokio::select! {
                biased;
                _ = cancelled.cancelled() => false,
                _ = tokio::time::sleep(delay) => true,
            };
            if fired {
                callback();
            }
        });

        TimerHandle::new(token)
    }
}

impl Drop for TokioDelayScheduler {
    fn drop(&mut self) {
        // shutdown_background is safe to call from within another runtime.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
