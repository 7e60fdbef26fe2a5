//! Span utilities and extension traits for safe-call tracing.

use std::fmt::Debug;

use tracing::{info_span, Span};

use crate::safecall::{HandlerKind, InvocationId};

/// Extension trait for adding context to spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for spans covering one invocation's execution.
pub struct InvocationSpan;

impl InvocationSpan {
    /// Create a span with standard fields.
    ///
    /// `status`, `error.message` and `elapsed_ms` are filled in when the
    /// work finishes.
    pub fn new<K: Debug>(id: InvocationId, identifier: &K, kind: HandlerKind) -> Span {
        info_span!(
            "safe_call",
            invocation = %id,
            identifier = ?identifier,
            kind = kind.as_str(),
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            elapsed_ms = tracing::field::Empty,
        )
    }
}
