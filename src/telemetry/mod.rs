//! Telemetry for the safe-call coordinator.
//!
//! Structured logging setup, per-invocation spans, and metric recording.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use self::metrics::{
    record_call_completed, record_call_latency, record_call_panicked, record_call_rejected,
    record_call_started, record_dispatch, record_stale_timeout, record_submission_refused,
    record_timeout,
};
pub use spans::{InvocationSpan, SpanExt};
