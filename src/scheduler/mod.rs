//! Execution facilities for the safe-call coordinator.
//!
//! Provides the named worker pools safe-calls run on and the delayed
//! scheduling used by timeout watchdogs.

mod pool;
mod thread_pool;
mod timer;

pub use pool::{Executor, PoolProvider, ThreadPoolConfig, ThreadPoolManager};
pub use thread_pool::{Task, ThreadPool, ThreadPoolError, ThreadPoolStats};
pub use timer::{DelayScheduler, TimerCallback, TimerError, TimerHandle, TokioDelayScheduler};
