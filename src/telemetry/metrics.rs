//! Metric recording through the `metrics` facade.
//!
//! No exporter is installed here; the embedding application decides where
//! these go.

use std::time::Duration;

use metrics::{counter, histogram};

use crate::safecall::HandlerKind;

pub fn record_call_started(kind: HandlerKind) {
    counter!("safecall_calls_started_total", "kind" => kind.as_str()).increment(1);
}

/// A call was rejected because its identifier was busy, and queued instead.
pub fn record_call_rejected(kind: HandlerKind) {
    counter!("safecall_calls_rejected_total", "kind" => kind.as_str()).increment(1);
}

pub fn record_call_latency(kind: HandlerKind, elapsed: Duration) {
    histogram!("safecall_call_duration_ms", "kind" => kind.as_str())
        .record(elapsed.as_secs_f64() * 1000.0);
}

pub fn record_call_completed(kind: HandlerKind) {
    counter!("safecall_calls_completed_total", "kind" => kind.as_str()).increment(1);
}

pub fn record_call_panicked() {
    counter!("safecall_calls_panicked_total").increment(1);
}

pub fn record_dispatch() {
    counter!("safecall_dispatched_total").increment(1);
}

pub fn record_submission_refused() {
    counter!("safecall_submissions_refused_total").increment(1);
}

/// A watchdog fired for an invocation that was no longer claimed.
pub fn record_stale_timeout() {
    counter!("safecall_stale_timeouts_total").increment(1);
}

pub fn record_timeout(kind: HandlerKind) {
    counter!("safecall_timeouts_total", "kind" => kind.as_str()).increment(1);
}
