//! Spans, tracers and the machinery that exports finished spans.
//!
//! Application code rarely touches this module directly: it starts spans
//! through [`Observability::start_span`](crate::Observability::start_span).
//! The pieces here are the building blocks behind it:
//!
//! * [`Tracer`] creates spans for one APM backend. Three backends exist:
//!   [`RecordingTracer`], [`TaggingTracer`] and [`NoopTracer`].
//! * [`BoxedTracer::start`] links a new span to the ambient [`Context`] and
//!   hands back a [`SpanGuard`] that ends it on every exit path.
//! * [`SpanProcessor`]s receive finished spans as [`SpanData`] and pass them
//!   to a [`SpanExporter`].
//!
//! [`Context`]: crate::Context
use crate::common::KeyValue;
use std::borrow::Cow;
use std::error::Error;
use std::fmt;
use std::time::SystemTime;

mod context;
mod export;
mod guard;
mod id_generator;
mod ids;
mod in_memory_exporter;
mod noop;
mod pipeline;
mod recording;
mod span_context;
mod span_processor;
mod tagging;
mod tracer;

pub use self::context::{SpanRef, TraceContextExt};
pub(crate) use self::context::SynchronizedSpan;
pub use self::export::{SpanData, SpanExporter};
pub use self::guard::SpanGuard;
pub use self::id_generator::{
    DatadogIdGenerator, IdGenerator, IncrementIdGenerator, RandomIdGenerator,
};
pub use self::ids::{SpanId, TraceFlags, TraceId};
pub use self::in_memory_exporter::{InMemorySpanExporter, InMemorySpanExporterBuilder};
pub use self::noop::{NonRecordingSpan, NoopTracer};
pub(crate) use self::pipeline::SpanPipeline;
pub use self::recording::{RecordingSpan, RecordingTracer};
pub use self::span_context::{SpanContext, TraceState, TraceStateError};
pub use self::span_processor::{
    BatchConfig, BatchConfigBuilder, BatchSpanProcessor, BatchSpanProcessorBuilder,
    SimpleSpanProcessor, SpanProcessor,
};
pub use self::tagging::{TaggingSpan, TaggingTracer};
pub use self::tracer::BoxedTracer;

/// The status of a [`Span`].
///
/// Statuses are ordered `Unset < Ok < Error`. Once a span is marked as an
/// error it stays an error: a later `Ok` is ignored, while a later `Error`
/// replaces the description.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Status {
    /// The default status.
    #[default]
    Unset,

    /// The operation contains an error.
    Error {
        /// The description of the error
        description: Cow<'static, str>,
    },

    /// The operation has been validated to have completed successfully.
    Ok,
}

impl Status {
    /// Create a new error status with a given description.
    ///
    /// # Examples
    ///
    /// ```
    /// use app_obs::trace::Status;
    ///
    /// // record error with `str` description
    /// let error_status = Status::error("something went wrong");
    ///
    /// // or with `String` description
    /// let error_status = Status::error(format!("too many foos: {}", 42));
    /// # drop(error_status);
    /// ```
    pub fn error(description: impl Into<Cow<'static, str>>) -> Self {
        Status::Error {
            description: description.into(),
        }
    }

    /// Returns `true` for any `Error` status.
    pub fn is_error(&self) -> bool {
        matches!(self, Status::Error { .. })
    }

    /// Applies `new` on top of this status, honoring the precedence rules.
    pub(crate) fn update(&mut self, new: Status) {
        match (&*self, &new) {
            (_, Status::Unset) => {}
            (Status::Error { .. }, Status::Ok) => {}
            _ => *self = new,
        }
    }
}

/// A timestamped annotation recorded on a span.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct Event {
    /// The name of this event.
    pub name: Cow<'static, str>,
    /// The time at which this event occurred.
    pub timestamp: SystemTime,
    /// Attributes that describe this event.
    pub attributes: Vec<KeyValue>,
}

impl Event {
    /// Create new `Event`
    pub fn new<T: Into<Cow<'static, str>>>(
        name: T,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
    ) -> Self {
        Event {
            name: name.into(),
            timestamp,
            attributes,
        }
    }
}

/// The operations every backend span supports.
///
/// A span represents a single operation within a trace. Implementations are
/// created by a [`Tracer`]; once [`end`](Span::end) has been called the span
/// is finished and further calls are ignored.
pub trait Span: Send + Sync + fmt::Debug {
    /// The identity of this span.
    fn span_context(&self) -> &SpanContext;

    /// Returns `true` while the span is recording information.
    fn is_recording(&self) -> bool;

    /// Sets a single attribute, replacing any previous value for its key.
    fn set_attribute(&mut self, attribute: KeyValue);

    /// Records a named event with attributes.
    fn add_event(&mut self, name: Cow<'static, str>, attributes: Vec<KeyValue>);

    /// Records an error together with describing attributes.
    fn record_error(&mut self, err: &dyn Error, attributes: Vec<KeyValue>);

    /// Updates the span status, see [`Status`] for the precedence rules.
    fn set_status(&mut self, status: Status);

    /// Finishes the span at the given time and hands it over for export.
    fn end_with_timestamp(&mut self, timestamp: SystemTime);

    /// Finishes the span now.
    fn end(&mut self) {
        self.end_with_timestamp(SystemTime::now());
    }
}

/// Creates spans for one APM backend.
///
/// Backends are chosen once at startup from configuration; the rest of the
/// crate only sees this trait, usually through a [`BoxedTracer`].
pub trait Tracer: Send + Sync + fmt::Debug {
    /// Builds a started span whose parent is the span active in `parent_cx`.
    ///
    /// This never fails: without a valid parent the span starts a new trace.
    fn build_span(
        &self,
        name: Cow<'static, str>,
        attributes: Vec<KeyValue>,
        parent_cx: &crate::Context,
    ) -> Box<dyn Span>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_is_sticky() {
        let mut status = Status::Unset;
        status.update(Status::error("first"));
        status.update(Status::Ok);
        assert_eq!(status, Status::error("first"));

        status.update(Status::error("second"));
        assert_eq!(status, Status::error("second"));
    }

    #[test]
    fn unset_never_overrides() {
        let mut status = Status::Ok;
        status.update(Status::Unset);
        assert_eq!(status, Status::Ok);
    }
}
