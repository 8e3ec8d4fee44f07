//! The Datadog-style backend: everything is recorded as span tags.
use crate::common::KeyValue;
use crate::trace::pipeline::SpanPipeline;
use crate::trace::{NonRecordingSpan, Span, SpanContext, SpanData, Status, Tracer};
use crate::Context;
use std::borrow::Cow;
use std::error::Error;
use std::sync::Arc;
use std::time::SystemTime;

const EVENT_TAG: &str = "event";
const ERROR_TAG: &str = "error";
const ERROR_MESSAGE_TAG: &str = "error.message";
const STATUS_TAG: &str = "status";

/// A tracer producing [`TaggingSpan`]s.
#[derive(Clone, Debug)]
pub struct TaggingTracer {
    pipeline: Arc<SpanPipeline>,
}

impl TaggingTracer {
    pub(crate) fn new(pipeline: Arc<SpanPipeline>) -> Self {
        TaggingTracer { pipeline }
    }
}

impl Tracer for TaggingTracer {
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
        Box::new(TaggingSpan {
            span_context: new_span.span_context,
            data: Some(data),
            pipeline: self.pipeline.clone(),
        })
    }
}

/// A span for backends that only understand flat tags.
///
/// Events set the `event` tag to their name and copy their attributes as
/// tags; errors set `error` and `error.message`; the status is mirrored in
/// the `status` tag. Later values overwrite earlier ones, so only the most
/// recent event survives.
#[derive(Debug)]
pub struct TaggingSpan {
    span_context: SpanContext,
    data: Option<SpanData>,
    pipeline: Arc<SpanPipeline>,
}

impl Span for TaggingSpan {
    fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    fn is_recording(&self) -> bool {
        self.data.is_some()
    }

    fn set_attribute(&mut self, attribute: KeyValue) {
        if let Some(data) = self.data.as_mut() {
            data.upsert_attribute(attribute);
        }
    }

    fn add_event(&mut self, name: Cow<'static, str>, attributes: Vec<KeyValue>) {
        if let Some(data) = self.data.as_mut() {
            data.upsert_attribute(KeyValue::new(EVENT_TAG, name));
            for attribute in attributes {
                data.upsert_attribute(attribute);
            }
        }
    }

    fn record_error(&mut self, err: &dyn Error, attributes: Vec<KeyValue>) {
        if let Some(data) = self.data.as_mut() {
            for attribute in attributes {
                data.upsert_attribute(attribute);
            }
            let message = err.to_string();
            data.upsert_attribute(KeyValue::new(ERROR_TAG, message.clone()));
            data.upsert_attribute(KeyValue::new(ERROR_MESSAGE_TAG, message));
        }
    }

    fn set_status(&mut self, status: Status) {
        if let Some(data) = self.data.as_mut() {
            data.status.update(status);
            let tag = match &data.status {
                Status::Unset => return,
                Status::Ok => Cow::Borrowed("ok"),
                Status::Error { description } => description.clone(),
            };
            data.upsert_attribute(KeyValue::new(STATUS_TAG, tag));
        }
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
    use crate::trace::{IncrementIdGenerator, InMemorySpanExporter, SimpleSpanProcessor};
    use crate::Value;

    #[derive(Debug)]
    struct Timeout;

    impl std::fmt::Display for Timeout {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("upstream timed out")
        }
    }

    impl Error for Timeout {}

    #[test]
    fn events_errors_and_status_become_tags() {
        let exporter = InMemorySpanExporter::default();
        let pipeline = SpanPipeline::new(
            vec![Arc::new(SimpleSpanProcessor::new(exporter.clone()))],
            Arc::new(Resource::default()),
            Box::new(IncrementIdGenerator::new()),
        );
        let tracer = TaggingTracer::new(Arc::new(pipeline));

        let mut span = tracer.build_span("fetch".into(), vec![], &Context::new());
        span.add_event("cache miss".into(), vec![KeyValue::new("key", "p-1")]);
        span.record_error(&Timeout, vec![]);
        span.set_status(Status::error("upstream timed out"));
        span.set_status(Status::Ok);
        span.end();

        let spans = exporter.get_finished_spans().unwrap();
        let span = &spans[0];
        assert!(span.events.is_empty());
        assert_eq!(span.attribute("event"), Some(&Value::from("cache miss")));
        assert_eq!(span.attribute("key"), Some(&Value::from("p-1")));
        assert_eq!(span.attribute("error"), Some(&Value::from("upstream timed out")));
        assert_eq!(span.attribute("status"), Some(&Value::from("upstream timed out")));
        assert_eq!(span.status, Status::error("upstream timed out"));
    }
}
