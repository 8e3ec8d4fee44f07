//! The per-request observability handle.
use crate::common::KeyValue;
use crate::context::{ContextGuard, FutureContextExt, WithContext};
use crate::logs::{CorrelatedLogger, NO_SPAN, NO_TRACE};
use crate::propagation::{HeaderInjector, Injector};
use crate::telemetry::Telemetry;
use crate::trace::{SpanGuard, SpanRef, TraceContextExt};
use crate::Context;
use std::borrow::Cow;
use std::future::Future;

/// Everything a layer of a request needs to take part in its trace.
///
/// A handle pairs the process-wide [`Telemetry`] with one position in a
/// trace. It is an immutable value: starting a span returns a *new* handle
/// for the child, so the caller's handle keeps pointing at the caller's span
/// no matter how the child ends. Pass it down the call chain by reference,
/// clone it into spawned tasks.
///
/// # Examples
///
/// ```
/// use app_obs::logs::FieldValue;
/// use app_obs::Telemetry;
///
/// fn fetch_item(obs: &app_obs::Observability, id: i64) -> Option<String> {
///     let (obs, _guard) = obs.start_span("fetch-item", vec![]);
///     obs.log().with([("id", FieldValue::from(id))]).info("fetching item");
///     Some(format!("item-{id}"))
/// }
///
/// let telemetry = Telemetry::builder().build();
/// let request = telemetry.background();
/// let (root, _root_guard) = request.start_span("handle-request", vec![]);
/// assert_eq!(fetch_item(&root, 7).as_deref(), Some("item-7"));
/// ```
#[derive(Clone, Debug)]
pub struct Observability {
    telemetry: Telemetry,
    cx: Context,
}

impl Observability {
    pub(crate) fn new(telemetry: Telemetry, cx: Context) -> Self {
        Observability { telemetry, cx }
    }

    /// Starts a child of this handle's span.
    ///
    /// The returned handle belongs to the child; the returned guard ends the
    /// child when dropped.
    pub fn start_span<T>(&self, name: T, attributes: Vec<KeyValue>) -> (Observability, SpanGuard)
    where
        T: Into<Cow<'static, str>>,
    {
        let (cx, guard) = self.telemetry.tracer().start(&self.cx, name, attributes);
        (Observability::new(self.telemetry.clone(), cx), guard)
    }

    /// Runs `f` inside a child span, ending it when `f` returns or unwinds.
    pub fn in_span<T, N, F>(&self, name: N, attributes: Vec<KeyValue>, f: F) -> T
    where
        N: Into<Cow<'static, str>>,
        F: FnOnce(&Observability) -> T,
    {
        let (obs, _guard) = self.start_span(name, attributes);
        f(&obs)
    }

    /// A logger correlated with this handle's span.
    pub fn log(&self) -> CorrelatedLogger {
        self.telemetry.logger(self.cx.clone())
    }

    /// The span this handle points at.
    pub fn span(&self) -> SpanRef<'_> {
        self.cx.span()
    }

    /// Writes this handle's trace position into an outbound carrier.
    pub fn inject(&self, injector: &mut dyn Injector) {
        self.telemetry
            .propagator()
            .inject_context(&self.cx, injector);
    }

    /// Writes this handle's trace position into outbound HTTP headers.
    pub fn inject_headers(&self, headers: &mut http::HeaderMap) {
        self.inject(&mut HeaderInjector(headers));
    }

    /// Hex trace id, or `"no-trace"` outside of a trace.
    pub fn trace_id(&self) -> String {
        let span_context = self.cx.span().span_context();
        if span_context.is_valid() {
            span_context.trace_id().to_string()
        } else {
            NO_TRACE.to_owned()
        }
    }

    /// Hex span id, or `"no-span"` outside of a span.
    pub fn span_id(&self) -> String {
        let span_context = self.cx.span().span_context();
        if span_context.is_valid() {
            span_context.span_id().to_string()
        } else {
            NO_SPAN.to_owned()
        }
    }

    /// The context this handle carries.
    pub fn context(&self) -> &Context {
        &self.cx
    }

    /// The telemetry pipeline this handle reports to.
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    fn ambient_context(&self) -> Context {
        self.cx.with_value(self.clone())
    }

    /// Installs this handle as the current one of this thread until the
    /// returned guard is dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use app_obs::{Observability, Telemetry};
    ///
    /// let telemetry = Telemetry::builder().build();
    /// let (obs, _span) = telemetry.background().start_span("job", vec![]);
    ///
    /// {
    ///     let _guard = obs.attach();
    ///     assert_eq!(Observability::current().span_id(), obs.span_id());
    /// }
    /// ```
    pub fn attach(&self) -> ContextGuard {
        self.ambient_context().attach()
    }

    /// The handle installed on this thread by [`attach`](Observability::attach)
    /// or [`scope`](Observability::scope).
    ///
    /// When none is installed a warning is emitted and a handle of
    /// [`Telemetry::disabled`] is returned, so callers can log and start
    /// spans unconditionally.
    pub fn current() -> Observability {
        Context::map_current(|cx| cx.get::<Observability>().cloned())
            .unwrap_or_else(|| Observability::fallback("thread context"))
    }

    /// Runs `future` with this handle installed on whichever thread polls it.
    pub fn scope<F: Future>(&self, future: F) -> WithContext<F> {
        future.with_context(self.ambient_context())
    }

    /// Stores this handle in a request's extensions.
    pub fn store_in(&self, extensions: &mut http::Extensions) {
        extensions.insert(self.clone());
    }

    /// The handle stored in a request's extensions, falling back like
    /// [`current`](Observability::current) when there is none.
    pub fn from_extensions(extensions: &http::Extensions) -> Observability {
        extensions
            .get::<Observability>()
            .cloned()
            .unwrap_or_else(|| Observability::fallback("request extensions"))
    }

    fn fallback(source: &'static str) -> Observability {
        obs_warn!(
            name: "Observability.NotInstalled",
            source = source,
            message = "No observability handle installed; using a disabled handle"
        );
        Telemetry::disabled().background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::InMemoryLogSink;
    use crate::trace::{IncrementIdGenerator, InMemorySpanExporter, Status};
    use crate::ApmType;

    fn telemetry() -> (Telemetry, InMemorySpanExporter, InMemoryLogSink) {
        let exporter = InMemorySpanExporter::default();
        let sink = InMemoryLogSink::default();
        let telemetry = Telemetry::builder()
            .with_simple_exporter(exporter.clone())
            .with_id_generator(IncrementIdGenerator::new())
            .with_log_sink(sink.clone())
            .build();
        (telemetry, exporter, sink)
    }

    #[test]
    fn start_span_leaves_parent_handle_untouched() {
        let (telemetry, exporter, _) = telemetry();
        let (root, root_guard) = telemetry.background().start_span("root", vec![]);
        let root_span_id = root.span_id();

        let (child, child_guard) = root.start_span("child", vec![]);
        assert_ne!(child.span_id(), root_span_id);
        assert_eq!(child.trace_id(), root.trace_id());
        child_guard.end();

        assert_eq!(root.span_id(), root_span_id);
        assert!(root.span().is_recording());
        root_guard.end();

        let child = exporter.spans_named("child").unwrap().remove(0);
        assert_eq!(child.parent_span_id.to_string(), root_span_id);
    }

    #[test]
    fn background_handle_reports_sentinels() {
        let (telemetry, _, sink) = telemetry();
        let obs = telemetry.background();
        assert_eq!(obs.trace_id(), NO_TRACE);
        assert_eq!(obs.span_id(), NO_SPAN);

        obs.log().info("starting");
        let record = sink.records().unwrap().remove(0);
        assert_eq!(record.trace_id_or_sentinel(), NO_TRACE);
    }

    #[test]
    fn in_span_returns_the_closure_value_and_ends_the_span() {
        let (telemetry, exporter, _) = telemetry();
        let value = telemetry
            .background()
            .in_span("compute", vec![KeyValue::new("n", 3)], |obs| {
                obs.log().info("computing");
                42
            });
        assert_eq!(value, 42);

        let span = exporter.spans_named("compute").unwrap().remove(0);
        assert_eq!(span.status, Status::Ok);
        assert_eq!(span.events.len(), 1);
    }

    #[test]
    fn current_falls_back_to_disabled_handle() {
        let obs = Observability::current();
        assert_eq!(obs.telemetry().apm_type(), ApmType::None);
        assert_eq!(obs.trace_id(), NO_TRACE);
        // still usable
        obs.in_span("ignored", vec![], |obs| obs.log().error("nothing recorded"));
    }

    #[test]
    fn attach_installs_and_restores() {
        let (telemetry, _, _) = telemetry();
        let (obs, _guard) = telemetry.background().start_span("job", vec![]);
        {
            let _attached = obs.attach();
            assert_eq!(Observability::current().span_id(), obs.span_id());
            {
                let (child, _child_guard) = Observability::current().start_span("step", vec![]);
                let _attached = child.attach();
                assert_eq!(Observability::current().span_id(), child.span_id());
            }
            assert_eq!(Observability::current().span_id(), obs.span_id());
        }
        assert_eq!(Observability::current().trace_id(), NO_TRACE);
    }

    #[test]
    fn extensions_round_trip() {
        let (telemetry, _, _) = telemetry();
        let (obs, _guard) = telemetry.background().start_span("request", vec![]);
        let mut extensions = http::Extensions::new();
        obs.store_in(&mut extensions);

        assert_eq!(Observability::from_extensions(&extensions).span_id(), obs.span_id());
        assert_eq!(
            Observability::from_extensions(&http::Extensions::new()).span_id(),
            NO_SPAN
        );
    }

    #[test]
    fn headers_continue_the_trace() {
        let (telemetry, exporter, _) = telemetry();
        let (client, client_guard) = telemetry.background().start_span("client", vec![]);
        let mut headers = http::HeaderMap::new();
        client.inject_headers(&mut headers);
        assert!(headers.contains_key("traceparent"));

        let server = telemetry.observability_from_headers(&headers);
        assert_eq!(server.trace_id(), client.trace_id());
        assert!(!server.span().is_recording());
        server.in_span("server", vec![], |_| ());
        client_guard.end();

        let server_span = exporter.spans_named("server").unwrap().remove(0);
        assert_eq!(server_span.parent_span_id.to_string(), client.span_id());
        assert_eq!(
            server_span.span_context.trace_id().to_string(),
            client.trace_id()
        );
    }

    #[tokio::test]
    async fn scope_installs_handle_while_polled() {
        let (telemetry, _, _) = telemetry();
        let (obs, _guard) = telemetry.background().start_span("task", vec![]);
        let expected = obs.span_id();

        let seen = obs
            .scope(async {
                tokio::task::yield_now().await;
                Observability::current().span_id()
            })
            .await;
        assert_eq!(seen, expected);
        assert_eq!(Observability::current().span_id(), NO_SPAN);
    }
}
