use crate::common::KeyValue;
use crate::trace::{SpanGuard, SynchronizedSpan, Tracer};
use crate::Context;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// A cheaply clonable handle to the backend [`Tracer`] chosen at startup.
#[derive(Clone)]
pub struct BoxedTracer(Arc<dyn Tracer>);

impl fmt::Debug for BoxedTracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BoxedTracer").field(&self.0).finish()
    }
}

impl BoxedTracer {
    /// Wraps a backend tracer.
    pub fn new<T: Tracer + 'static>(tracer: T) -> Self {
        BoxedTracer(Arc::new(tracer))
    }

    /// Starts a span as a child of the span active in `parent_cx`.
    ///
    /// Returns the context for work done inside the span together with the
    /// guard that ends it. `parent_cx` itself is left as it was, so callers
    /// keep their own position in the trace no matter how the child ends.
    ///
    /// # Examples
    ///
    /// ```
    /// use app_obs::trace::{BoxedTracer, NoopTracer, TraceContextExt};
    /// use app_obs::Context;
    ///
    /// let tracer = BoxedTracer::new(NoopTracer::new());
    /// let parent = Context::new();
    ///
    /// let (child, guard) = tracer.start(&parent, "lookup", vec![]);
    /// child.span().add_event("cache hit", vec![]);
    /// guard.end();
    ///
    /// assert!(!parent.has_active_span());
    /// ```
    pub fn start<T>(
        &self,
        parent_cx: &Context,
        name: T,
        attributes: Vec<KeyValue>,
    ) -> (Context, SpanGuard)
    where
        T: Into<Cow<'static, str>>,
    {
        let span = self.0.build_span(name.into(), attributes, parent_cx);
        let span = Arc::new(SynchronizedSpan::new(span, parent_cx.span.clone()));
        (
            parent_cx.with_synchronized_span(span.clone()),
            SpanGuard::new(span),
        )
    }

    /// Runs `f` inside a new span, ending it when `f` returns or unwinds.
    pub fn in_span<T, N, F>(&self, parent_cx: &Context, name: N, f: F) -> T
    where
        N: Into<Cow<'static, str>>,
        F: FnOnce(&Context) -> T,
    {
        let (cx, _guard) = self.start(parent_cx, name, Vec::new());
        f(&cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Resource;
    use crate::trace::{
        IncrementIdGenerator, InMemorySpanExporter, RecordingTracer, SimpleSpanProcessor,
        SpanPipeline, Status, TraceContextExt,
    };

    fn recording() -> (BoxedTracer, InMemorySpanExporter) {
        let exporter = InMemorySpanExporter::default();
        let pipeline = SpanPipeline::new(
            vec![Arc::new(SimpleSpanProcessor::new(exporter.clone()))],
            Arc::new(Resource::default()),
            Box::new(IncrementIdGenerator::new()),
        );
        (
            BoxedTracer::new(RecordingTracer::new(Arc::new(pipeline))),
            exporter,
        )
    }

    #[test]
    fn child_links_to_parent_and_parent_context_is_unchanged() {
        let (tracer, exporter) = recording();
        let (root_cx, root) = tracer.start(&Context::new(), "root", vec![]);
        let root_before = root_cx.span().span_context().clone();

        let (child_cx, child) = tracer.start(&root_cx, "child", vec![]);
        assert_eq!(
            child_cx.span().span_context().trace_id(),
            root_before.trace_id()
        );
        child.end();

        assert_eq!(root_cx.span().span_context(), &root_before);
        assert!(root_cx.span().is_recording());
        root.end();

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans[0].name, "child");
        assert_eq!(spans[0].parent_span_id, root_before.span_id());
        assert_eq!(spans[1].name, "root");
    }

    #[test]
    fn ending_defaults_status_to_ok_but_keeps_errors() {
        let (tracer, exporter) = recording();
        let (_, ok) = tracer.start(&Context::new(), "ok", vec![]);
        ok.end();

        let (cx, failed) = tracer.start(&Context::new(), "failed", vec![]);
        cx.span().set_status(Status::error("boom"));
        failed.end();

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans[0].status, Status::Ok);
        assert_eq!(spans[1].status, Status::error("boom"));
    }

    #[test]
    fn double_end_exports_once() {
        let (tracer, exporter) = recording();
        let (cx, guard) = tracer.start(&Context::new(), "twice", vec![]);
        cx.span().end();
        assert!(!cx.span().is_recording());
        guard.end();

        assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
    }

    #[test]
    fn panicking_scope_ends_span_with_error() {
        let (tracer, exporter) = recording();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            tracer.in_span::<(), _, _>(&Context::new(), "explodes", |_cx| panic!("kaboom"));
        }));
        assert!(result.is_err());

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert!(spans[0].status.is_error());
    }
}
