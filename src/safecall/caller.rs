//! Caller-facing front-end: build and run safe-calls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::error::SafeCallError;
use super::invocation::{CallKey, HandlerKind, Invocation, InvocationId, TimeoutHandler};
use super::manager::SafeCallManager;
use super::wrapper::{RunOutcome, TrackingWrapper};

/// What happened to a call made through [`SafeCaller`].
#[derive(Debug)]
pub enum CallOutcome<K: CallKey, T> {
    /// The work ran and produced a value.
    Completed(T),
    /// Async call accepted; it runs later on the worker pool.
    Queued { invocation: InvocationId },
    /// Another call was running. This one was queued and runs later.
    Duplicate { running: Arc<TrackingWrapper<K>> },
    /// No result within the timeout. `active` is what was running then.
    TimedOut { active: Option<Arc<TrackingWrapper<K>>> },
    /// The work panicked.
    Failed,
}

impl<K: CallKey, T> CallOutcome<K, T> {
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            _ => None,
        }
    }
}

enum Reply<K: CallKey, T> {
    Done(T),
    Rejected(Arc<TrackingWrapper<K>>),
    Panicked,
}

/// Entry point for making safe-calls against a [`SafeCallManager`].
pub struct SafeCaller<K: CallKey> {
    manager: Arc<SafeCallManager<K>>,
    default_timeout: Duration,
    accepting: AtomicBool,
}

impl<K: CallKey> SafeCaller<K> {
    pub fn new(manager: Arc<SafeCallManager<K>>, default_timeout: Duration) -> Self {
        Self {
            manager,
            default_timeout,
            accepting: AtomicBool::new(true),
        }
    }

    /// Start building a call against `identifier`.
    pub fn call(&self, identifier: K) -> CallBuilder<'_, K> {
        CallBuilder {
            caller: self,
            identifier,
            kind: HandlerKind::Sync,
            timeout: self.default_timeout,
            hook: None,
        }
    }

    pub fn manager(&self) -> &Arc<SafeCallManager<K>> {
        &self.manager
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Refuse new calls from now on. Calls already queued still run.
    pub fn stop_accepting(&self) {
        self.accepting.store(false, Ordering::SeqCst);
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }
}

/// Builder for a single safe-call.
pub struct CallBuilder<'a, K: CallKey> {
    caller: &'a SafeCaller<K>,
    identifier: K,
    kind: HandlerKind,
    timeout: Duration,
    hook: Option<Arc<dyn TimeoutHandler<K>>>,
}

impl<K: CallKey> CallBuilder<'_, K> {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fire and forget: queue the call and return immediately.
    pub fn with_async(mut self) -> Self {
        self.kind = HandlerKind::Async;
        self
    }

    pub fn on_timeout(mut self, hook: Arc<dyn TimeoutHandler<K>>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Run `work` under the safe-call rules.
    ///
    /// Sync calls made from inside the worker pool run inline; other sync
    /// calls are executed on the pool while the caller waits up to the
    /// timeout. Async calls are queued.
    pub fn run<T, F>(self, work: F) -> Result<CallOutcome<K, T>, SafeCallError>
    where
        T: Send + 'static,
        F: FnOnce(&CancellationToken) -> T + Send + 'static,
    {
        let caller = self.caller;
        if !caller.is_accepting() {
            return Err(SafeCallError::ShuttingDown);
        }
        let manager = &caller.manager;

        if self.kind == HandlerKind::Async {
            let invocation = self.build(move |token| {
                let _ = work(token);
            });
            let id = invocation.id();
            manager.enqueue(Arc::new(invocation));
            return Ok(CallOutcome::Queued { invocation: id });
        }

        if manager.is_safe_context() {
            tracing::trace!(identifier = ?self.identifier, "already in safe context, invoking directly");
            return Ok(CallOutcome::Completed(work(&CancellationToken::new())));
        }

        let (tx, rx) = mpsc::channel::<Reply<K, T>>();
        let done_tx = tx.clone();
        let timeout = self.timeout;
        let identifier = self.identifier.clone();
        let invocation = Arc::new(self.build(move |token| {
            let _ = done_tx.send(Reply::Done(work(token)));
        }));

        let wrapper = TrackingWrapper::new(invocation.clone());
        let task_manager = Arc::clone(manager);
        manager.scheduler()?.submit(Box::new(move || {
            match wrapper.run(&task_manager) {
                RunOutcome::Completed => {}
                RunOutcome::Panicked => {
                    let _ = tx.send(Reply::Panicked);
                }
                RunOutcome::Rejected { running } => {
                    let _ = tx.send(Reply::Rejected(running));
                }
            }
        }))?;

        match rx.recv_timeout(timeout) {
            Ok(Reply::Done(value)) => Ok(CallOutcome::Completed(value)),
            Ok(Reply::Rejected(running)) => {
                tracing::debug!(
                    invocation = %invocation.id(),
                    identifier = ?identifier,
                    running = %running.invocation().id(),
                    "duplicate safe-call queued for later"
                );
                Ok(CallOutcome::Duplicate { running })
            }
            Ok(Reply::Panicked) | Err(RecvTimeoutError::Disconnected) => Ok(CallOutcome::Failed),
            Err(RecvTimeoutError::Timeout) => {
                let active = manager.active_wrapper(&identifier);
                if let Some(active) = &active {
                    manager.notify_timeout(&invocation, active);
                }
                Ok(CallOutcome::TimedOut { active })
            }
        }
    }

    fn build<F>(self, work: F) -> Invocation<K>
    where
        F: FnOnce(&CancellationToken) + Send + 'static,
    {
        let invocation = Invocation::new(self.identifier, self.kind, self.timeout, work);
        match self.hook {
            Some(hook) => invocation.with_timeout_hook(hook),
            None => invocation,
        }
    }
}
