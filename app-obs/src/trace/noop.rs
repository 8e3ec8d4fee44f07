//! The backend used when no APM is configured.
//!
//! Spans are never recorded or exported, but the parent's span context is
//! carried forward so that outgoing requests still propagate the caller's
//! trace and log records keep its ids.
use crate::common::KeyValue;
use crate::trace::{Span, SpanContext, Status, TraceContextExt, Tracer};
use crate::Context;
use std::borrow::Cow;
use std::error::Error;
use std::time::SystemTime;

/// A span that records nothing.
#[derive(Clone, Debug, PartialEq)]
pub struct NonRecordingSpan {
    span_context: SpanContext,
}

impl NonRecordingSpan {
    /// Wraps a span context in a span that records nothing.
    pub fn new(span_context: SpanContext) -> Self {
        NonRecordingSpan { span_context }
    }
}

impl Span for NonRecordingSpan {
    fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    fn is_recording(&self) -> bool {
        false
    }

    fn set_attribute(&mut self, _attribute: KeyValue) {}

    fn add_event(&mut self, _name: Cow<'static, str>, _attributes: Vec<KeyValue>) {}

    fn record_error(&mut self, _err: &dyn Error, _attributes: Vec<KeyValue>) {}

    fn set_status(&mut self, _status: Status) {}

    fn end_with_timestamp(&mut self, _timestamp: SystemTime) {}
}

/// A tracer whose spans are non-recording copies of their parent.
#[derive(Clone, Debug, Default)]
pub struct NoopTracer {
    _private: (),
}

impl NoopTracer {
    /// Create a new no-op tracer
    pub fn new() -> Self {
        NoopTracer { _private: () }
    }
}

impl Tracer for NoopTracer {
    fn build_span(
        &self,
        _name: Cow<'static, str>,
        _attributes: Vec<KeyValue>,
        parent_cx: &Context,
    ) -> Box<dyn Span> {
        Box::new(NonRecordingSpan::new(
            parent_cx.span().span_context().clone(),
        ))
    }
}
