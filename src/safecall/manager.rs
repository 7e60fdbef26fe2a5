//! Safe-call manager: per-identifier execution registry and dispatcher.
//!
//! Tracks which wrapper is executing for each identifier so a second call to
//! the same identifier can be detected, queues such calls, and drains the
//! queues into the worker pool one invocation per identifier at a time.
//!
//! Three independently locked maps hold all state: the queue store, the
//! active wrappers, and the invocations claimed for asynchronous dispatch.
//! No lock is held while submitting to the pool or calling owner hooks.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

use super::invocation::{CallKey, Invocation, InvocationId, LogTimeoutHandler, TimeoutHandler};
use super::wrapper::TrackingWrapper;
use crate::scheduler::{DelayScheduler, Executor, PoolProvider, ThreadPoolError, TimerHandle};
use crate::telemetry;

/// Delay before re-offering an invocation the worker pool refused.
const SUBMIT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Outcome of registering a call as started.
#[derive(Debug)]
pub enum StartOutcome<K: CallKey> {
    /// The call is now the active one for its identifier.
    Started,
    /// Another call is active. The invocation has been queued and will run
    /// asynchronously once the identifier is free.
    Rejected { running: Arc<TrackingWrapper<K>> },
}

impl<K: CallKey> StartOutcome<K> {
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started)
    }
}

/// Snapshot of manager counters.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SafeCallStats {
    pub started: u64,
    pub rejected: u64,
    pub enqueued: u64,
    pub dispatched: u64,
    pub completed: u64,
    pub panicked: u64,
    pub timeouts_notified: u64,
    pub stale_timeouts: u64,
    pub submissions_refused: u64,
}

#[derive(Default)]
pub(super) struct Counters {
    started: AtomicU64,
    rejected: AtomicU64,
    enqueued: AtomicU64,
    dispatched: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
    pub(super) timeouts_notified: AtomicU64,
    pub(super) stale_timeouts: AtomicU64,
    submissions_refused: AtomicU64,
}

/// Coordinates safe-calls so that at most one runs per identifier.
pub struct SafeCallManager<K: CallKey> {
    queues: Mutex<HashMap<K, VecDeque<Arc<Invocation<K>>>>>,
    pub(super) active: Mutex<HashMap<K, Arc<TrackingWrapper<K>>>>,
    pub(super) claimed: Mutex<HashMap<K, Arc<Invocation<K>>>>,
    pub(super) watchers: Mutex<HashMap<InvocationId, TimerHandle>>,
    /// Identifiers with a submission retry already scheduled.
    retrying: Mutex<HashSet<K>>,
    pub(super) watchdog: Arc<dyn DelayScheduler>,
    pools: Arc<dyn PoolProvider>,
    pool_name: String,
    enforce_single_thread: AtomicBool,
    default_hook: Arc<dyn TimeoutHandler<K>>,
    pub(super) counters: Counters,
}

impl<K: CallKey> SafeCallManager<K> {
    pub fn new(
        watchdog: Arc<dyn DelayScheduler>,
        pools: Arc<dyn PoolProvider>,
        pool_name: impl Into<String>,
        enforce_single_thread: bool,
    ) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            active: Mutex::new(HashMap::new()),
            claimed: Mutex::new(HashMap::new()),
            watchers: Mutex::new(HashMap::new()),
            retrying: Mutex::new(HashSet::new()),
            watchdog,
            pools,
            pool_name: pool_name.into(),
            enforce_single_thread: AtomicBool::new(enforce_single_thread),
            default_hook: Arc::new(LogTimeoutHandler),
            counters: Counters::default(),
        }
    }

    /// Hook used for invocations that do not carry their own.
    pub fn with_default_timeout_hook(mut self, hook: Arc<dyn TimeoutHandler<K>>) -> Self {
        self.default_hook = hook;
        self
    }

    pub fn pool_name(&self) -> &str {
        &self.pool_name
    }

    pub fn enforces_single_thread(&self) -> bool {
        self.enforce_single_thread.load(Ordering::SeqCst)
    }

    /// Toggle per-identifier serialization at runtime.
    pub fn set_enforce_single_thread(&self, enforce: bool) {
        self.enforce_single_thread.store(enforce, Ordering::SeqCst);
    }

    /// Register `wrapper` as the active call for the invocation's identifier.
    ///
    /// Async invocations that start get a timeout watchdog. A rejected
    /// invocation is queued: at the head if it was the identifier's claimed
    /// dispatch, otherwise at the back.
    pub fn record_call_start(
        self: &Arc<Self>,
        invocation: &Arc<Invocation<K>>,
        wrapper: &Arc<TrackingWrapper<K>>,
    ) -> StartOutcome<K> {
        let running = {
            let mut active = self.active.lock();
            match active.get(invocation.identifier()) {
                Some(other) if self.enforces_single_thread() => Some(other.clone()),
                _ => {
                    active.insert(invocation.identifier().clone(), wrapper.clone());
                    None
                }
            }
        };

        if let Some(running) = running {
            tracing::debug!(
                invocation = %invocation.id(),
                identifier = ?invocation.identifier(),
                running = %running.invocation().id(),
                "identifier busy, queueing call"
            );
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            telemetry::record_call_rejected(invocation.kind());
            self.requeue(invocation.clone());
            return StartOutcome::Rejected { running };
        }

        self.counters.started.fetch_add(1, Ordering::Relaxed);
        telemetry::record_call_started(invocation.kind());
        if invocation.is_async() {
            self.watch(invocation);
        }
        StartOutcome::Started
    }

    /// Clear the registry for the invocation's identifier and dispatch the
    /// next queued call, if any.
    pub fn record_call_end(
        self: &Arc<Self>,
        invocation: &Arc<Invocation<K>>,
        _wrapper: &Arc<TrackingWrapper<K>>,
    ) {
        let identifier = invocation.identifier();
        self.active.lock().remove(identifier);
        self.claimed.lock().remove(identifier);
        self.unwatch(invocation.id());

        self.counters.completed.fetch_add(1, Ordering::Relaxed);
        telemetry::record_call_completed(invocation.kind());
        tracing::trace!(invocation = %invocation.id(), "finished");
        self.trigger(identifier);
    }

    /// Queue an invocation for asynchronous execution.
    pub fn enqueue(self: &Arc<Self>, invocation: Arc<Invocation<K>>) {
        let identifier = invocation.identifier().clone();
        {
            let mut queues = self.queues.lock();
            queues.entry(identifier.clone()).or_default().push_back(invocation);
        }
        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        self.trigger(&identifier);
    }

    /// Queue a rejected invocation without letting later arrivals overtake
    /// the current claim.
    fn requeue(self: &Arc<Self>, invocation: Arc<Invocation<K>>) {
        let identifier = invocation.identifier().clone();
        {
            let claimed = self.claimed.lock();
            let is_claim = claimed
                .get(&identifier)
                .is_some_and(|c| c.id() == invocation.id());
            let mut queues = self.queues.lock();
            let queue = queues.entry(identifier.clone()).or_default();
            if is_claim {
                queue.push_front(invocation);
            } else {
                queue.push_back(invocation);
            }
        }
        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        self.trigger(&identifier);
    }

    /// Submit the next queued invocation for `identifier` if nothing is
    /// running or already claimed for it.
    fn trigger(self: &Arc<Self>, identifier: &K) {
        tracing::trace!(identifier = ?identifier, "triggering submissions");

        if self.enforces_single_thread() && self.active.lock().contains_key(identifier) {
            tracing::trace!(identifier = ?identifier, "identifier is already running");
            return;
        }

        let next = {
            let mut claimed = self.claimed.lock();
            if claimed.contains_key(identifier) {
                tracing::trace!(
                    identifier = ?identifier,
                    "identifier is already scheduled for asynchronous execution"
                );
                return;
            }
            let Some(next) = self.dequeue(identifier) else {
                return;
            };
            claimed.insert(identifier.clone(), next.clone());
            next
        };

        tracing::trace!(invocation = %next.id(), "scheduling for asynchronous execution");
        let wrapper = TrackingWrapper::new(next.clone());
        let manager = Arc::clone(self);
        let submitted = self
            .scheduler()
            .and_then(|pool| pool.submit(Box::new(move || {
                wrapper.run(&manager);
            })));

        match submitted {
            Ok(()) => {
                self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
                telemetry::record_dispatch();
                tracing::trace!(invocation = %next.id(), "submitted for asynchronous execution");
            }
            Err(e) => {
                self.return_to_head(&next);
                self.counters.submissions_refused.fetch_add(1, Ordering::Relaxed);
                telemetry::record_submission_refused();
                if e == ThreadPoolError::PoolShutdown {
                    tracing::error!(
                        invocation = %next.id(),
                        identifier = ?identifier,
                        pool = %self.pool_name,
                        "worker pool is shut down, safe-call stays queued"
                    );
                } else {
                    tracing::warn!(
                        invocation = %next.id(),
                        identifier = ?identifier,
                        pool = %self.pool_name,
                        error = %e,
                        retry_ms = SUBMIT_RETRY_DELAY.as_millis() as u64,
                        "worker pool refused safe-call, retrying"
                    );
                    self.schedule_retry(identifier);
                }
            }
        }
    }

    /// Re-trigger `identifier` after a delay. At most one retry is pending
    /// per identifier.
    fn schedule_retry(self: &Arc<Self>, identifier: &K) {
        if !self.retrying.lock().insert(identifier.clone()) {
            return;
        }
        let manager = Arc::downgrade(self);
        let identifier = identifier.clone();
        // Nothing to cancel: a retry that finds the queue empty is a no-op.
        let _ = self.watchdog.schedule(
            SUBMIT_RETRY_DELAY,
            Box::new(move || {
                if let Some(manager) = manager.upgrade() {
                    manager.retrying.lock().remove(&identifier);
                    manager.trigger(&identifier);
                }
            }),
        );
    }

    fn dequeue(&self, identifier: &K) -> Option<Arc<Invocation<K>>> {
        self.queues.lock().get_mut(identifier)?.pop_front()
    }

    /// Undo a claim whose submission failed and put the invocation back at
    /// the head of its queue. Both happen under the claimed lock so no later
    /// invocation can be dispatched ahead of it.
    fn return_to_head(&self, invocation: &Arc<Invocation<K>>) {
        let identifier = invocation.identifier();
        let mut claimed = self.claimed.lock();
        if claimed.get(identifier).is_some_and(|c| c.id() == invocation.id()) {
            claimed.remove(identifier);
        }
        self.queues
            .lock()
            .entry(identifier.clone())
            .or_default()
            .push_front(invocation.clone());
    }

    /// Whether the current thread belongs to this manager's worker pool.
    pub fn is_safe_context(&self) -> bool {
        std::thread::current()
            .name()
            .and_then(|name| name.strip_prefix(self.pool_name.as_str()))
            .is_some_and(|rest| rest.starts_with('-'))
    }

    /// The worker pool safe-calls are submitted to.
    pub fn scheduler(&self) -> Result<Arc<dyn Executor>, ThreadPoolError> {
        self.pools.pool(&self.pool_name)
    }

    /// Call the invocation's timeout hook, or the default one.
    pub(crate) fn notify_timeout(&self, invocation: &Invocation<K>, active: &Arc<TrackingWrapper<K>>) {
        self.counters.timeouts_notified.fetch_add(1, Ordering::Relaxed);
        telemetry::record_timeout(invocation.kind());
        match invocation.timeout_hook() {
            Some(hook) => hook.on_timeout(invocation, active),
            None => self.default_hook.on_timeout(invocation, active),
        }
    }

    pub(crate) fn record_panic(&self) {
        self.counters.panicked.fetch_add(1, Ordering::Relaxed);
        telemetry::record_call_panicked();
    }

    /// The wrapper currently executing for `identifier`.
    pub fn active_wrapper(&self, identifier: &K) -> Option<Arc<TrackingWrapper<K>>> {
        self.active.lock().get(identifier).cloned()
    }

    /// The invocation currently claimed for asynchronous dispatch on `identifier`.
    pub fn claimed_invocation(&self, identifier: &K) -> Option<InvocationId> {
        self.claimed.lock().get(identifier).map(|inv| inv.id())
    }

    /// Number of invocations waiting in `identifier`'s queue.
    pub fn queue_len(&self, identifier: &K) -> usize {
        self.queues.lock().get(identifier).map_or(0, VecDeque::len)
    }

    /// Ids of the invocations queued for `identifier`, head first.
    pub fn queued_ids(&self, identifier: &K) -> Vec<InvocationId> {
        self.queues
            .lock()
            .get(identifier)
            .map(|q| q.iter().map(|inv| inv.id()).collect())
            .unwrap_or_default()
    }

    /// Total invocations waiting across all identifiers.
    pub fn queued_total(&self) -> usize {
        self.queues.lock().values().map(VecDeque::len).sum()
    }

    /// Distinct invocations still queued, claimed or running.
    ///
    /// A running async call is both claimed and active and counts once.
    pub fn pending_count(&self) -> usize {
        let mut ids: HashSet<InvocationId> = self
            .queues
            .lock()
            .values()
            .flat_map(|queue| queue.iter().map(|inv| inv.id()))
            .collect();
        ids.extend(self.claimed.lock().values().map(|inv| inv.id()));
        ids.extend(self.active.lock().values().map(|w| w.invocation().id()));
        ids.len()
    }

    /// True when nothing is queued, claimed or running.
    pub fn is_idle(&self) -> bool {
        self.pending_count() == 0
    }

    /// Drop every queued invocation. Returns how many were dropped.
    pub fn clear_queues(&self) -> usize {
        let mut queues = self.queues.lock();
        let dropped = queues.values().map(VecDeque::len).sum();
        queues.clear();
        dropped
    }

    pub fn stats(&self) -> SafeCallStats {
        let c = &self.counters;
        SafeCallStats {
            started: c.started.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            enqueued: c.enqueued.load(Ordering::Relaxed),
            dispatched: c.dispatched.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            panicked: c.panicked.load(Ordering::Relaxed),
            timeouts_notified: c.timeouts_notified.load(Ordering::Relaxed),
            stale_timeouts: c.stale_timeouts.load(Ordering::Relaxed),
            submissions_refused: c.submissions_refused.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
