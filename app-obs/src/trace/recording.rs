//! The OTLP-style backend: events and errors become span events.
use crate::common::KeyValue;
use crate::trace::pipeline::SpanPipeline;
use crate::trace::{Event, NonRecordingSpan, Span, SpanContext, SpanData, Status, Tracer};
use crate::Context;
use std::borrow::Cow;
use std::error::Error;
use std::sync::Arc;
use std::time::SystemTime;

/// Name of the event produced by [`Span::record_error`].
pub(crate) const EXCEPTION_EVENT: &str = "exception";
/// Attribute carrying the error's display text on the exception event.
pub(crate) const EXCEPTION_MESSAGE: &str = "exception.message";

/// A tracer producing [`RecordingSpan`]s.
#[derive(Clone, Debug)]
pub struct RecordingTracer {
    pipeline: Arc<SpanPipeline>,
}

impl RecordingTracer {
    pub(crate) fn new(pipeline: Arc<SpanPipeline>) -> Self {
        RecordingTracer { pipeline }
    }
}

impl Tracer for RecordingTracer {
    fn build_span(
        &self,
        name: Cow<'static, str>,
        attributes: Vec<KeyValue>,
        parent_cx: &Context,
    ) -> Box<dyn Span> {
        let new_span = self.pipeline.new_span(parent_cx);
        if !new_span.record {
            return Box::new(NonRecordingSpan::new(new_span.span_context));
        }

        let data = self.pipeline.start_data(name, attributes, &new_span);
        Box::new(RecordingSpan {
            span_context: new_span.span_context,
            data: Some(data),
            pipeline: self.pipeline.clone(),
        })
    }
}

/// A span that keeps events as timestamped span events.
///
/// Errors are recorded as an `exception` event whose `exception.message`
/// attribute holds the error's display text.
#[derive(Debug)]
pub struct RecordingSpan {
    span_context: SpanContext,
    data: Option<SpanData>,
    pipeline: Arc<SpanPipeline>,
}

impl RecordingSpan {
    fn with_data<T>(&mut self, f: impl FnOnce(&mut SpanData) -> T) -> Option<T> {
        self.data.as_mut().map(f)
    }
}

impl Span for RecordingSpan {
    fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    fn is_recording(&self) -> bool {
        self.data.is_some()
    }

    fn set_attribute(&mut self, attribute: KeyValue) {
        self.with_data(|data| data.upsert_attribute(attribute));
    }

    fn add_event(&mut self, name: Cow<'static, str>, attributes: Vec<KeyValue>) {
        self.with_data(|data| {
            data.events
                .push(Event::new(name, SystemTime::now(), attributes))
        });
    }

    fn record_error(&mut self, err: &dyn Error, attributes: Vec<KeyValue>) {
        let mut event_attributes = Vec::with_capacity(attributes.len() + 1);
        event_attributes.push(KeyValue::new(EXCEPTION_MESSAGE, err.to_string()));
        event_attributes.extend(attributes);
        self.add_event(Cow::Borrowed(EXCEPTION_EVENT), event_attributes);
    }

    fn set_status(&mut self, status: Status) {
        self.with_data(|data| data.status.update(status));
    }

    fn end_with_timestamp(&mut self, timestamp: SystemTime) {
        if let Some(mut data) = self.data.take() {
            data.end_time = timestamp;
            self.pipeline.on_end(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Resource;
    use crate::trace::{IncrementIdGenerator, InMemorySpanExporter, SimpleSpanProcessor, SpanId};
    use std::fmt;

    #[derive(Debug)]
    struct NotFound;

    impl fmt::Display for NotFound {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("not found")
        }
    }

    impl Error for NotFound {}

    fn tracer() -> (RecordingTracer, InMemorySpanExporter) {
        let exporter = InMemorySpanExporter::default();
        let pipeline = SpanPipeline::new(
            vec![Arc::new(SimpleSpanProcessor::new(exporter.clone()))],
            Arc::new(Resource::default()),
            Box::new(IncrementIdGenerator::new()),
        );
        (RecordingTracer::new(Arc::new(pipeline)), exporter)
    }

    #[test]
    fn root_span_starts_a_new_trace() {
        let (tracer, exporter) = tracer();
        let mut span = tracer.build_span("root".into(), vec![], &Context::new());
        assert!(span.is_recording());
        span.end();
        assert!(!span.is_recording());

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].parent_span_id, SpanId::INVALID);
        assert!(spans[0].span_context.is_valid());
        assert!(spans[0].span_context.is_sampled());
    }

    #[test]
    fn record_error_adds_exception_event() {
        let (tracer, exporter) = tracer();
        let mut span = tracer.build_span("op".into(), vec![], &Context::new());
        span.record_error(&NotFound, vec![KeyValue::new("event", "log_error")]);
        span.set_status(Status::error("not found"));
        span.end();

        let spans = exporter.get_finished_spans().unwrap();
        let event = &spans[0].events[0];
        assert_eq!(event.name, EXCEPTION_EVENT);
        assert_eq!(
            event.attributes,
            vec![
                KeyValue::new(EXCEPTION_MESSAGE, "not found"),
                KeyValue::new("event", "log_error"),
            ]
        );
        assert_eq!(spans[0].status, Status::error("not found"));
    }

    #[test]
    fn calls_after_end_are_ignored() {
        let (tracer, exporter) = tracer();
        let mut span = tracer.build_span("op".into(), vec![], &Context::new());
        span.end();
        span.add_event("late".into(), vec![]);
        span.end();
        assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
        assert!(exporter.get_finished_spans().unwrap()[0].events.is_empty());
    }
}
