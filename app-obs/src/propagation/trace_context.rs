//! # W3C Trace Context Propagator
use crate::propagation::{Extractor, Injector, TextMapPropagator};
use crate::trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState};
use crate::Context;
use std::str::FromStr;

const SUPPORTED_VERSION: u8 = 0;
const MAX_VERSION: u8 = 254;
const TRACEPARENT_HEADER: &str = "traceparent";
const TRACESTATE_HEADER: &str = "tracestate";
static TRACE_CONTEXT_HEADER_FIELDS: [&str; 2] = [TRACEPARENT_HEADER, TRACESTATE_HEADER];

/// Propagates span contexts in the [W3C TraceContext] format.
///
/// `traceparent: 00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01`
/// carries version, trace id, parent span id and flags;
/// `tracestate: vendor1=value1,vendor2=value2` carries vendor data.
///
/// Malformed headers are ignored: the request is then handled as the root
/// of a new trace.
///
/// [W3C TraceContext]: https://www.w3.org/TR/trace-context/
#[derive(Clone, Debug, Default)]
pub struct TraceContextPropagator {
    _private: (),
}

impl TraceContextPropagator {
    /// Create a new `TraceContextPropagator`.
    pub fn new() -> Self {
        TraceContextPropagator { _private: () }
    }

    fn extract_span_context(&self, extractor: &dyn Extractor) -> Option<SpanContext> {
        let header_value = extractor.get(TRACEPARENT_HEADER)?.trim();
        let parts = header_value.split_terminator('-').collect::<Vec<&str>>();
        if parts.len() < 4 {
            return None;
        }

        let is_lower_hex = |s: &str, len: usize| {
            s.len() == len && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        };
        if !(is_lower_hex(parts[0], 2)
            && is_lower_hex(parts[1], 32)
            && is_lower_hex(parts[2], 16)
            && is_lower_hex(parts[3], 2))
        {
            return None;
        }

        // Version 0 has exactly four parts; later versions may append more.
        let version = u8::from_str_radix(parts[0], 16).ok()?;
        if version > MAX_VERSION || version == 0 && parts.len() != 4 {
            return None;
        }

        let trace_id = TraceId::from_hex(parts[1]).ok()?;
        let span_id = SpanId::from_hex(parts[2]).ok()?;
        let flags = u8::from_str_radix(parts[3], 16).ok()?;
        if version == 0 && flags > 2 {
            return None;
        }

        // Only the sampled bit is understood.
        let trace_flags = TraceFlags::new(flags) & TraceFlags::SAMPLED;
        let trace_state = extractor
            .get(TRACESTATE_HEADER)
            .and_then(|state| TraceState::from_str(state).ok())
            .unwrap_or_default();

        let span_context = SpanContext::new(trace_id, span_id, trace_flags, true, trace_state);
        span_context.is_valid().then_some(span_context)
    }
}

impl TextMapPropagator for TraceContextPropagator {
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        let span = cx.span();
        let span_context = span.span_context();
        if span_context.is_valid() {
            let header_value = format!(
                "{:02x}-{}-{}-{:02x}",
                SUPPORTED_VERSION,
                span_context.trace_id(),
                span_context.span_id(),
                span_context.trace_flags() & TraceFlags::SAMPLED
            );
            injector.set(TRACEPARENT_HEADER, header_value);
            let state = span_context.trace_state().header();
            if !state.is_empty() {
                injector.set(TRACESTATE_HEADER, state);
            }
        }
    }

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        match self.extract_span_context(extractor) {
            Some(span_context) => cx.with_remote_span_context(span_context),
            None => cx.clone(),
        }
    }

    fn fields(&self) -> &'static [&'static str] {
        &TRACE_CONTEXT_HEADER_FIELDS
    }
}
