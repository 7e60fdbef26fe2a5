//! Telemetry module tests for the safe-call coordinator.

use std::path::PathBuf;
use std::time::Duration;

use safecall_core::safecall::{HandlerKind, Invocation};
use safecall_core::telemetry::{
    record_call_completed, record_call_latency, record_call_panicked, record_call_rejected,
    record_call_started, record_dispatch, record_stale_timeout, record_submission_refused,
    record_timeout, InvocationSpan, LogConfig, LogError, LogFormat, SpanExt,
};
use tracing::Span;

// =============================================================================
// LogConfig Tests
// =============================================================================

#[test]
fn log_config_default_is_json() {
    let config = LogConfig::default();
    assert_eq!(config.format, LogFormat::Json);
    assert_eq!(config.level, "info");
    assert!(config.output_path.is_none());
}

#[test]
fn log_config_with_output_path() {
    let config = LogConfig {
        format: LogFormat::Pretty,
        level: "safecall_core=trace".to_string(),
        output_path: Some(PathBuf::from("/tmp/safecall.log")),
    };
    assert_eq!(config.output_path, Some(PathBuf::from("/tmp/safecall.log")));
}

#[test]
fn log_format_parses_aliases() {
    assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
    assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
}

// =============================================================================
// LogError Tests
// =============================================================================

#[test]
fn log_error_display() {
    let error = LogError::InvalidFilter("bad filter".to_string());
    assert!(error.to_string().contains("Invalid log filter"));
    assert!(error.to_string().contains("bad filter"));

    let error = LogError::InvalidFormat("xml".to_string());
    assert!(error.to_string().contains("xml"));

    assert!(LogError::AlreadyInitialized.to_string().contains("already initialized"));
}

// =============================================================================
// Span Tests
// =============================================================================

#[test]
fn span_ext_record_result_handles_both_arms() {
    let span = Span::none();
    span.record_result(&Ok::<(), String>(()));
    span.record_result(&Err::<(), _>("device unplugged"));
}

#[test]
fn invocation_span_enters_without_subscriber() {
    let invocation = Invocation::new("lamp", HandlerKind::Async, Duration::from_secs(1), |_| {});
    let span = InvocationSpan::new(invocation.id(), invocation.identifier(), invocation.kind());
    let _guard = span.enter();
    span.record("elapsed_ms", 12u64);
    span.record_result(&Ok::<(), String>(()));
}

// =============================================================================
// Metrics Tests
// =============================================================================

#[test]
fn metrics_record_without_recorder() {
    // No recorder installed: every call is a no-op.
    for kind in [HandlerKind::Sync, HandlerKind::Async] {
        record_call_started(kind);
        record_call_rejected(kind);
        record_call_latency(kind, Duration::from_millis(3));
        record_call_completed(kind);
        record_timeout(kind);
    }
    record_call_panicked();
    record_dispatch();
    record_stale_timeout();
    record_submission_refused();
}
