use crate::common::{Key, KeyValue};
use crate::logs::{Field, FieldValue, Level, LogRecord, LogSink};
use crate::trace::{SpanRef, Status, TraceContextExt};
use crate::Context;
use std::borrow::Cow;
use std::fmt;
use std::panic::Location;
use std::str::FromStr;
use std::sync::Arc;
use std::time::SystemTime;

/// How far an error logged inside a span spreads its `Error` status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ErrorPropagation {
    /// Only the span active in the logger's context is marked.
    #[default]
    Span,
    /// The active span and every still-open local ancestor are marked.
    Ancestors,
}

impl FromStr for ErrorPropagation {
    type Err = crate::TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "span" => Ok(ErrorPropagation::Span),
            "ancestors" => Ok(ErrorPropagation::Ancestors),
            other => Err(crate::TelemetryError::InvalidConfig(format!(
                "unknown error propagation policy {other:?}"
            ))),
        }
    }
}

/// Error recorded on a span when an error-level log carries no error value.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct LoggedError(Cow<'static, str>);

/// A structured logger bound to one [`Context`].
///
/// Every record carries the trace and span ids of that context, and records
/// at `info` and above are mirrored onto its span while the span records.
/// Loggers are immutable: [`with`](CorrelatedLogger::with) returns a new
/// logger and leaves the original untouched.
#[derive(Clone)]
pub struct CorrelatedLogger {
    sink: Arc<dyn LogSink>,
    cx: Context,
    min_level: Level,
    error_propagation: ErrorPropagation,
    fields: Vec<Field>,
}

impl fmt::Debug for CorrelatedLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelatedLogger")
            .field("sink", &self.sink)
            .field("min_level", &self.min_level)
            .field("error_propagation", &self.error_propagation)
            .field("fields", &self.fields)
            .finish()
    }
}

impl CorrelatedLogger {
    /// Creates a logger writing to `sink` on behalf of `cx`.
    pub fn new(sink: Arc<dyn LogSink>, cx: Context) -> Self {
        CorrelatedLogger {
            sink,
            cx,
            min_level: Level::default(),
            error_propagation: ErrorPropagation::default(),
            fields: Vec::new(),
        }
    }

    /// Records below `level` are dropped before reaching the sink or span.
    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    /// Sets how far error-level logs spread the `Error` status.
    pub fn with_error_propagation(mut self, policy: ErrorPropagation) -> Self {
        self.error_propagation = policy;
        self
    }

    /// Returns a logger that adds `fields` to every record after the ones
    /// already accumulated.
    ///
    /// # Examples
    ///
    /// ```
    /// use app_obs::logs::{CorrelatedLogger, FieldValue, InMemoryLogSink};
    /// use app_obs::Context;
    /// use std::sync::Arc;
    ///
    /// let sink = InMemoryLogSink::default();
    /// let log = CorrelatedLogger::new(Arc::new(sink.clone()), Context::new());
    ///
    /// let request_log = log.with([("productID", FieldValue::from(42))]);
    /// request_log.info("looking up product");
    /// log.info("unrelated");
    ///
    /// let records = sink.records().unwrap();
    /// assert_eq!(records[0].fields.len(), 1);
    /// assert!(records[1].fields.is_empty());
    /// ```
    pub fn with<I, K>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, FieldValue)>,
        K: Into<Key>,
    {
        let mut logger = self.clone();
        logger
            .fields
            .extend(fields.into_iter().map(|(key, value)| Field::new(key, value)));
        logger
    }

    /// Shorthand for [`with`](CorrelatedLogger::with) and a single field.
    pub fn with_field(&self, key: impl Into<Key>, value: impl Into<FieldValue>) -> Self {
        let mut logger = self.clone();
        logger.fields.push(Field::new(key, value));
        logger
    }

    /// The context this logger correlates with.
    pub fn context(&self) -> &Context {
        &self.cx
    }

    /// Whether records at `level` are written.
    pub fn enabled(&self, level: Level) -> bool {
        level >= self.min_level
    }

    /// Logs at debug level. Debug records never touch the span.
    #[track_caller]
    pub fn debug(&self, message: impl Into<Cow<'static, str>>) {
        self.log(Level::Debug, message, None::<(Key, FieldValue)>);
    }

    /// Logs at info level and adds an event to the active span.
    #[track_caller]
    pub fn info(&self, message: impl Into<Cow<'static, str>>) {
        self.log(Level::Info, message, None::<(Key, FieldValue)>);
    }

    /// Logs at warn level and adds an event to the active span.
    #[track_caller]
    pub fn warn(&self, message: impl Into<Cow<'static, str>>) {
        self.log(Level::Warn, message, None::<(Key, FieldValue)>);
    }

    /// Logs at error level and marks the active span as failed.
    ///
    /// The error recorded on the span is the last `error` field holding an
    /// error value, or the message itself when there is none.
    #[track_caller]
    pub fn error(&self, message: impl Into<Cow<'static, str>>) {
        self.log(Level::Error, message, None::<(Key, FieldValue)>);
    }

    /// Logs `message` at `level` with extra call-site fields.
    ///
    /// The record's [`source`](LogRecord::source) is the caller's location.
    #[track_caller]
    pub fn log<I, K>(&self, level: Level, message: impl Into<Cow<'static, str>>, fields: I)
    where
        I: IntoIterator<Item = (K, FieldValue)>,
        K: Into<Key>,
    {
        if !self.enabled(level) {
            return;
        }

        let span = self.cx.span();
        let span_context = span.span_context();
        let (trace_id, span_id) = if span_context.is_valid() {
            (Some(span_context.trace_id()), Some(span_context.span_id()))
        } else {
            (None, None)
        };

        let mut all_fields = self.fields.clone();
        all_fields.extend(fields.into_iter().map(|(key, value)| Field::new(key, value)));
        let record = LogRecord {
            timestamp: SystemTime::now(),
            level,
            message: message.into(),
            fields: all_fields,
            trace_id,
            span_id,
            source: Some(Location::caller()),
        };

        if span.is_recording() {
            self.mirror(span, &record);
        }

        if let Err(err) = self.sink.write(&record) {
            obs_warn!(
                name: "LogSink.WriteFailed",
                level = record.level.as_str(),
                error = err.to_string()
            );
        }
    }

    fn mirror(&self, span: SpanRef<'_>, record: &LogRecord) {
        match record.level {
            Level::Debug => {}
            Level::Info | Level::Warn => {
                span.add_event(record.message.clone(), field_attributes(&record.fields));
            }
            Level::Error => {
                let mut attributes = field_attributes(&record.fields);
                attributes.push(KeyValue::new("event", "log_error"));
                attributes.push(KeyValue::new("message", record.message.clone()));

                let description: Cow<'static, str> = match record.error() {
                    Some(err) => {
                        span.record_error(err.as_ref(), attributes);
                        err.to_string().into()
                    }
                    None => {
                        span.record_error(&LoggedError(record.message.clone()), attributes);
                        record.message.clone()
                    }
                };

                span.set_status(Status::error(description.clone()));
                if self.error_propagation == ErrorPropagation::Ancestors {
                    span.mark_ancestors_error(&description);
                }
            }
        }
    }
}

fn field_attributes(fields: &[Field]) -> Vec<KeyValue> {
    fields
        .iter()
        .map(|field| KeyValue::new(field.key.clone(), field.value.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::{InMemoryLogSink, NO_SPAN, NO_TRACE};
    use crate::resource::Resource;
    use crate::trace::{
        BoxedTracer, IncrementIdGenerator, InMemorySpanExporter, RecordingTracer,
        SimpleSpanProcessor, SpanPipeline,
    };
    use crate::Value;

    #[derive(Debug, thiserror::Error)]
    #[error("product 7 not found")]
    struct NotFound;

    fn setup() -> (BoxedTracer, InMemorySpanExporter, InMemoryLogSink) {
        let exporter = InMemorySpanExporter::default();
        let pipeline = SpanPipeline::new(
            vec![Arc::new(SimpleSpanProcessor::new(exporter.clone()))],
            Arc::new(Resource::default()),
            Box::new(IncrementIdGenerator::new()),
        );
        (
            BoxedTracer::new(RecordingTracer::new(Arc::new(pipeline))),
            exporter,
            InMemoryLogSink::default(),
        )
    }

    #[test]
    fn records_outside_a_span_use_sentinels() {
        let sink = InMemoryLogSink::default();
        let log = CorrelatedLogger::new(Arc::new(sink.clone()), Context::new());
        log.info("starting");

        let records = sink.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].trace_id_or_sentinel(), NO_TRACE);
        assert_eq!(records[0].span_id_or_sentinel(), NO_SPAN);
    }

    #[test]
    fn records_carry_the_caller_location() {
        let sink = InMemoryLogSink::default();
        let log = CorrelatedLogger::new(Arc::new(sink.clone()), Context::new());
        let line = line!() + 1;
        log.warn("located");
        log.log(Level::Info, "direct", [("k", FieldValue::from(1))]);

        let records = sink.records().unwrap();
        let sources: Vec<_> = records
            .iter()
            .map(|record| record.source.map(|l| (l.file(), l.line())))
            .collect();
        assert_eq!(
            sources,
            [Some((file!(), line)), Some((file!(), line + 1))]
        );
    }

    #[test]
    fn info_and_warn_become_span_events_debug_does_not() {
        let (tracer, exporter, sink) = setup();
        let (cx, guard) = tracer.start(&Context::new(), "op", vec![]);
        let log = CorrelatedLogger::new(Arc::new(sink.clone()), cx)
            .with_min_level(Level::Debug)
            .with_field("productID", 7);

        log.debug("cache probe");
        log.info("cache miss");
        log.warn("slow query");
        guard.end();

        let span = exporter.spans_named("op").unwrap().remove(0);
        let names: Vec<_> = span.events.iter().map(|e| e.name.as_ref()).collect();
        assert_eq!(names, vec!["cache miss", "slow query"]);
        assert_eq!(
            span.events[0].attributes,
            vec![KeyValue::new("productID", "7")]
        );
        assert_eq!(span.status, Status::Ok);

        let records = sink.records().unwrap();
        assert_eq!(records.len(), 3);
        for record in &records {
            assert_eq!(record.trace_id, Some(span.span_context.trace_id()));
            assert_eq!(record.span_id, Some(span.span_context.span_id()));
        }
    }

    #[test]
    fn error_with_error_field_records_it_and_fails_the_span() {
        let (tracer, exporter, sink) = setup();
        let (cx, guard) = tracer.start(&Context::new(), "op", vec![]);
        let log = CorrelatedLogger::new(Arc::new(sink), cx);

        log.log(
            Level::Error,
            "lookup failed",
            [("error", FieldValue::error(NotFound))],
        );
        guard.end();

        let span = exporter.spans_named("op").unwrap().remove(0);
        assert_eq!(span.status, Status::error("product 7 not found"));
        let event = &span.events[0];
        assert_eq!(event.name, "exception");
        assert!(event
            .attributes
            .contains(&KeyValue::new("event", "log_error")));
        assert!(event
            .attributes
            .contains(&KeyValue::new("exception.message", "product 7 not found")));
    }

    #[test]
    fn error_without_error_field_uses_the_message() {
        let (tracer, exporter, sink) = setup();
        let (cx, guard) = tracer.start(&Context::new(), "op", vec![]);
        CorrelatedLogger::new(Arc::new(sink), cx).error("inventory unavailable");
        guard.end();

        let span = exporter.spans_named("op").unwrap().remove(0);
        assert_eq!(span.status, Status::error("inventory unavailable"));
        assert_eq!(
            span.events[0].attributes[0].value,
            Value::from("inventory unavailable")
        );
    }

    #[test]
    fn ancestors_policy_marks_open_parents() {
        let (tracer, exporter, sink) = setup();
        let (root_cx, root) = tracer.start(&Context::new(), "root", vec![]);
        let (child_cx, child) = tracer.start(&root_cx, "child", vec![]);

        CorrelatedLogger::new(Arc::new(sink.clone()), child_cx)
            .with_error_propagation(ErrorPropagation::Ancestors)
            .error("boom");
        child.end();
        CorrelatedLogger::new(Arc::new(sink), root_cx).info("recovered");
        root.end();

        let root = exporter.spans_named("root").unwrap().remove(0);
        assert_eq!(root.status, Status::error("boom"));
    }

    #[test]
    fn span_policy_leaves_parents_alone() {
        let (tracer, exporter, sink) = setup();
        let (root_cx, root) = tracer.start(&Context::new(), "root", vec![]);
        let (child_cx, child) = tracer.start(&root_cx, "child", vec![]);

        CorrelatedLogger::new(Arc::new(sink), child_cx).error("boom");
        child.end();
        root.end();

        assert_eq!(
            exporter.spans_named("root").unwrap()[0].status,
            Status::Ok
        );
        assert_eq!(
            exporter.spans_named("child").unwrap()[0].status,
            Status::error("boom")
        );
    }

    #[test]
    fn records_below_min_level_are_dropped() {
        let sink = InMemoryLogSink::default();
        let log = CorrelatedLogger::new(Arc::new(sink.clone()), Context::new())
            .with_min_level(Level::Warn);
        log.info("ignored");
        log.warn("kept");
        assert_eq!(sink.records().unwrap().len(), 1);
    }

    #[test]
    fn ended_span_is_not_mirrored() {
        let (tracer, exporter, sink) = setup();
        let (cx, guard) = tracer.start(&Context::new(), "op", vec![]);
        guard.end();
        let log = CorrelatedLogger::new(Arc::new(sink.clone()), cx);
        log.error("late");

        assert_eq!(exporter.spans_named("op").unwrap()[0].status, Status::Ok);
        let records = sink.records().unwrap();
        assert_ne!(records[0].trace_id_or_sentinel(), NO_TRACE);
    }
}
