//! Invocation data: one attempt to call into a serialized target.

use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::wrapper::TrackingWrapper;

/// Key grouping invocations that must never run concurrently.
pub trait CallKey: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> CallKey for T where T: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static {}

/// Process-unique invocation identity, assigned at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InvocationId(u64);

impl InvocationId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "inv-{}", self.0)
    }
}

/// How the owner wants the call handled. Only async calls are watched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    #[default]
    Sync,
    Async,
}

impl HandlerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Async => "async",
        }
    }
}

/// Deferred work. The token is triggered if the owner interrupts the call.
pub type Work = Box<dyn FnOnce(&CancellationToken) + Send + 'static>;

/// Owner hook notified when an async invocation overstays its timeout.
pub trait TimeoutHandler<K: CallKey>: Send + Sync {
    fn on_timeout(&self, invocation: &Invocation<K>, active: &Arc<TrackingWrapper<K>>);
}

impl<K, F> TimeoutHandler<K> for F
where
    K: CallKey,
    F: Fn(&Invocation<K>, &Arc<TrackingWrapper<K>>) + Send + Sync,
{
    fn on_timeout(&self, invocation: &Invocation<K>, active: &Arc<TrackingWrapper<K>>) {
        self(invocation, active)
    }
}

/// Wrap a closure as a shareable timeout hook.
pub fn timeout_hook<K, F>(f: F) -> Arc<dyn TimeoutHandler<K>>
where
    K: CallKey,
    F: Fn(&Invocation<K>, &Arc<TrackingWrapper<K>>) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Default hook: report the overdue call and the thread it is blocked on.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTimeoutHandler;

impl<K: CallKey> TimeoutHandler<K> for LogTimeoutHandler {
    fn on_timeout(&self, invocation: &Invocation<K>, active: &Arc<TrackingWrapper<K>>) {
        tracing::warn!(
            invocation = %invocation.id(),
            identifier = ?invocation.identifier(),
            timeout_ms = invocation.timeout().as_millis() as u64,
            active = %active.invocation().id(),
            thread = active.thread_name().as_deref().unwrap_or("<not started>"),
            running_ms = active.running_for().map(|d| d.as_millis() as u64),
            "safe-call timed out"
        );
    }
}

/// A single call attempt.
pub struct Invocation<K: CallKey> {
    id: InvocationId,
    identifier: K,
    kind: HandlerKind,
    timeout: Duration,
    work: Mutex<Option<Work>>,
    timeout_hook: Option<Arc<dyn TimeoutHandler<K>>>,
    cancel: CancellationToken,
    created_at: Instant,
}

impl<K: CallKey> Invocation<K> {
    pub fn new<F>(identifier: K, kind: HandlerKind, timeout: Duration, work: F) -> Self
    where
        F: FnOnce(&CancellationToken) + Send + 'static,
    {
        Self {
            id: InvocationId::next(),
            identifier,
            kind,
            timeout,
            work: Mutex::new(Some(Box::new(work))),
            timeout_hook: None,
            cancel: CancellationToken::new(),
            created_at: Instant::now(),
        }
    }

    /// Replace the coordinator's default timeout hook for this invocation.
    pub fn with_timeout_hook(mut self, hook: Arc<dyn TimeoutHandler<K>>) -> Self {
        self.timeout_hook = Some(hook);
        self
    }

    pub fn id(&self) -> InvocationId {
        self.id
    }

    pub fn identifier(&self) -> &K {
        &self.identifier
    }

    pub fn kind(&self) -> HandlerKind {
        self.kind
    }

    pub fn is_async(&self) -> bool {
        self.kind == HandlerKind::Async
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Token passed to the work when it runs.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the work is still waiting to be executed.
    pub fn is_pending(&self) -> bool {
        self.work.lock().is_some()
    }

    pub(crate) fn take_work(&self) -> Option<Work> {
        self.work.lock().take()
    }

    pub(crate) fn timeout_hook(&self) -> Option<&Arc<dyn TimeoutHandler<K>>> {
        self.timeout_hook.as_ref()
    }
}

impl<K: CallKey> fmt::Debug for Invocation<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("id", &self.id)
            .field("identifier", &self.identifier)
            .field("kind", &self.kind)
            .field("timeout", &self.timeout)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
