//! # Datadog header propagator
use crate::propagation::{Extractor, Injector, TextMapPropagator};
use crate::trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState};
use crate::Context;

const DATADOG_TRACE_ID_HEADER: &str = "x-datadog-trace-id";
const DATADOG_PARENT_ID_HEADER: &str = "x-datadog-parent-id";
const DATADOG_SAMPLING_PRIORITY_HEADER: &str = "x-datadog-sampling-priority";
static DATADOG_HEADER_FIELDS: [&str; 3] = [
    DATADOG_TRACE_ID_HEADER,
    DATADOG_PARENT_ID_HEADER,
    DATADOG_SAMPLING_PRIORITY_HEADER,
];

#[derive(Debug, Clone, Copy, PartialEq)]
enum SamplingPriority {
    UserReject = -1,
    AutoReject = 0,
    AutoKeep = 1,
    UserKeep = 2,
}

/// Propagates span contexts in Datadog's header format.
///
/// Ids are decimal 64-bit integers. Only the low 64 bits of a trace id are
/// sent, so services using this propagator should generate ids with
/// [`DatadogIdGenerator`](crate::trace::DatadogIdGenerator). A missing
/// sampling priority leaves the trace sampled.
#[derive(Clone, Debug, Default)]
pub struct DatadogPropagator {
    _private: (),
}

impl DatadogPropagator {
    /// Creates a new `DatadogPropagator`.
    pub fn new() -> Self {
        DatadogPropagator { _private: () }
    }

    fn extract_sampling_priority(value: &str) -> Option<SamplingPriority> {
        match value.trim().parse::<i32>().ok()? {
            -1 => Some(SamplingPriority::UserReject),
            0 => Some(SamplingPriority::AutoReject),
            1 => Some(SamplingPriority::AutoKeep),
            2 => Some(SamplingPriority::UserKeep),
            _ => None,
        }
    }

    fn extract_span_context(&self, extractor: &dyn Extractor) -> Option<SpanContext> {
        let trace_id = extractor
            .get(DATADOG_TRACE_ID_HEADER)?
            .trim()
            .parse::<u64>()
            .ok()?;
        let span_id = extractor
            .get(DATADOG_PARENT_ID_HEADER)?
            .trim()
            .parse::<u64>()
            .ok()?;
        let sampled = match extractor
            .get(DATADOG_SAMPLING_PRIORITY_HEADER)
            .and_then(Self::extract_sampling_priority)
        {
            Some(SamplingPriority::UserReject) | Some(SamplingPriority::AutoReject) => {
                TraceFlags::NOT_SAMPLED
            }
            Some(SamplingPriority::AutoKeep) | Some(SamplingPriority::UserKeep) | None => {
                TraceFlags::SAMPLED
            }
        };

        let span_context = SpanContext::new(
            TraceId::from(u128::from(trace_id)),
            SpanId::from(span_id),
            sampled,
            true,
            TraceState::NONE,
        );
        span_context.is_valid().then_some(span_context)
    }
}

impl TextMapPropagator for DatadogPropagator {
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        let span = cx.span();
        let span_context = span.span_context();
        if span_context.is_valid() {
            let low_bits = u128::from_be_bytes(span_context.trace_id().to_bytes()) as u64;
            injector.set(DATADOG_TRACE_ID_HEADER, low_bits.to_string());
            injector.set(
                DATADOG_PARENT_ID_HEADER,
                span_context.span_id().to_u64().to_string(),
            );
            let priority = if span_context.is_sampled() {
                SamplingPriority::AutoKeep
            } else {
                SamplingPriority::AutoReject
            };
            injector.set(
                DATADOG_SAMPLING_PRIORITY_HEADER,
                (priority as i32).to_string(),
            );
        }
    }

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        match self.extract_span_context(extractor) {
            Some(span_context) => cx.with_remote_span_context(span_context),
            None => cx.clone(),
        }
    }

    fn fields(&self) -> &'static [&'static str] {
        &DATADOG_HEADER_FIELDS
    }
}
