use crate::common::KeyValue;
use crate::error::{TelemetryError, TelemetryResult};
use crate::resource::Resource;
use crate::trace::{
    IdGenerator, SpanContext, SpanData, SpanId, SpanProcessor, Status, TraceContextExt,
    TraceFlags, TraceState,
};
use crate::Context;
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

/// State shared by every recording backend: where spans come from (ids,
/// resource) and where they go once finished (processors).
#[derive(Debug)]
pub(crate) struct SpanPipeline {
    processors: Vec<Arc<dyn SpanProcessor>>,
    resource: Arc<Resource>,
    id_generator: Box<dyn IdGenerator>,
    is_shutdown: AtomicBool,
}

/// Identity chosen for a span about to start.
pub(crate) struct NewSpan {
    pub(crate) span_context: SpanContext,
    pub(crate) parent_span_id: SpanId,
    pub(crate) record: bool,
}

impl SpanPipeline {
    pub(crate) fn new(
        processors: Vec<Arc<dyn SpanProcessor>>,
        resource: Arc<Resource>,
        id_generator: Box<dyn IdGenerator>,
    ) -> Self {
        SpanPipeline {
            processors,
            resource,
            id_generator,
            is_shutdown: AtomicBool::new(false),
        }
    }

    pub(crate) fn resource(&self) -> &Arc<Resource> {
        &self.resource
    }

    /// Chooses ids for a child of the span active in `parent_cx`.
    ///
    /// A valid parent, local or remote, donates its trace id, flags and trace
    /// state. Otherwise the span is the sampled root of a new trace. Spans of
    /// unsampled traces, and every span after shutdown, are not recorded.
    pub(crate) fn new_span(&self, parent_cx: &Context) -> NewSpan {
        let parent = parent_cx.span();
        let parent = parent.span_context();
        let (trace_id, parent_span_id, flags, state) = if parent.is_valid() {
            (
                parent.trace_id(),
                parent.span_id(),
                parent.trace_flags(),
                parent.trace_state().clone(),
            )
        } else {
            (
                self.id_generator.new_trace_id(),
                SpanId::INVALID,
                TraceFlags::SAMPLED,
                TraceState::NONE,
            )
        };
        let span_context = SpanContext::new(
            trace_id,
            self.id_generator.new_span_id(),
            flags,
            false,
            state,
        );

        NewSpan {
            record: span_context.is_sampled() && !self.is_shutdown.load(Ordering::Relaxed),
            span_context,
            parent_span_id,
        }
    }

    pub(crate) fn start_data(
        &self,
        name: Cow<'static, str>,
        attributes: Vec<KeyValue>,
        new_span: &NewSpan,
    ) -> SpanData {
        let now = SystemTime::now();
        SpanData {
            span_context: new_span.span_context.clone(),
            parent_span_id: new_span.parent_span_id,
            name,
            start_time: now,
            end_time: now,
            attributes,
            events: Vec::new(),
            status: Status::Unset,
            resource: self.resource.clone(),
        }
    }

    /// Hands a finished span to every processor.
    pub(crate) fn on_end(&self, data: SpanData) {
        if let Some((last, rest)) = self.processors.split_last() {
            for processor in rest {
                processor.on_end(data.clone());
            }
            last.on_end(data);
        }
    }

    pub(crate) fn force_flush(&self) -> TelemetryResult {
        let errors: Vec<String> = self
            .processors
            .iter()
            .filter_map(|p| p.force_flush().err())
            .map(|err| err.to_string())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(TelemetryError::InternalFailure(errors.join("; ")))
        }
    }

    pub(crate) fn shutdown_with_timeout(&self, timeout: Duration) -> TelemetryResult {
        if self.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(TelemetryError::AlreadyShutdown);
        }

        // One deadline for all processors, not one per processor.
        let deadline = Instant::now() + timeout;
        let mut timed_out = false;
        let mut errors = Vec::new();
        for processor in &self.processors {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match processor.shutdown_with_timeout(remaining) {
                Ok(()) => {}
                Err(TelemetryError::Timeout(_)) => timed_out = true,
                Err(err) => errors.push(err.to_string()),
            }
        }

        match (timed_out, errors.is_empty()) {
            (true, _) => Err(TelemetryError::Timeout(timeout)),
            (false, true) => Ok(()),
            (false, false) => Err(TelemetryError::InternalFailure(errors.join("; "))),
        }
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.is_shutdown.load(Ordering::Relaxed)
    }
}
