//! Trace exporters
use crate::common::KeyValue;
use crate::error::{ExportResult, TelemetryResult};
use crate::resource::Resource;
use crate::trace::{Event, SpanContext, SpanId, Status};
use futures_util::future::BoxFuture;
use std::borrow::Cow;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::SystemTime;

/// `SpanExporter` defines the interface that protocol-specific exporters must
/// implement so that they can be plugged into the pipeline.
///
/// Exporters are driven by a single [`SpanProcessor`] at a time, which is
/// why the methods take `&mut self`.
///
/// [`SpanProcessor`]: crate::trace::SpanProcessor
pub trait SpanExporter: Send + Sync + Debug {
    /// Exports a batch of finished spans.
    ///
    /// The returned future must not borrow from the exporter; processors
    /// drive it to completion before handing over the next batch. Failures
    /// are reported by the processor through internal diagnostics and never
    /// reach application code.
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult>;

    /// Flushes anything buffered by the exporter itself.
    fn force_flush(&mut self) -> TelemetryResult {
        Ok(())
    }

    /// Shuts down the exporter. Called once, after the final export.
    fn shutdown(&mut self) -> TelemetryResult {
        Ok(())
    }
}

/// `SpanData` contains all the information collected by a span and can be
/// used by exporters as a standard input.
#[derive(Clone, Debug, PartialEq)]
pub struct SpanData {
    /// Exportable `SpanContext`
    pub span_context: SpanContext,
    /// Span parent id, [`SpanId::INVALID`] for root spans
    pub parent_span_id: SpanId,
    /// Span name
    pub name: Cow<'static, str>,
    /// Span start time
    pub start_time: SystemTime,
    /// Span end time
    pub end_time: SystemTime,
    /// Span attributes
    pub attributes: Vec<KeyValue>,
    /// Span events
    pub events: Vec<Event>,
    /// Span status
    pub status: Status,
    /// Attributes of the service that produced the span
    pub resource: Arc<Resource>,
}

impl SpanData {
    /// Returns the value of the attribute named `key`, if set.
    pub fn attribute(&self, key: &str) -> Option<&crate::Value> {
        self.attributes
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| &kv.value)
    }

    pub(crate) fn upsert_attribute(&mut self, attribute: KeyValue) {
        match self.attributes.iter_mut().find(|kv| kv.key == attribute.key) {
            Some(existing) => existing.value = attribute.value,
            None => self.attributes.push(attribute),
        }
    }
}
