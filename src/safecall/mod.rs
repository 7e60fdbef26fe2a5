//! Safe-call coordination.
//!
//! Serializes invocations per identifier: a call attempted while another call
//! for the same identifier is running is queued and executed later on the
//! worker pool, in FIFO order. Async invocations are watched and their owner
//! is notified when they stay claimed past their timeout.

mod caller;
mod error;
mod invocation;
mod manager;
mod watchdog;
mod wrapper;

pub use caller::{CallBuilder, CallOutcome, SafeCaller};
pub use error::SafeCallError;
pub use invocation::{
    timeout_hook, CallKey, HandlerKind, Invocation, InvocationId, LogTimeoutHandler,
    TimeoutHandler, Work,
};
pub use manager::{SafeCallManager, SafeCallStats, StartOutcome};
pub use wrapper::{RunOutcome, TrackingWrapper};
