use crate::error::{ExportResult, TelemetryError, TelemetryResult};
use crate::trace::{SpanData, SpanExporter};
use futures_util::future::BoxFuture;
use std::sync::{Arc, Mutex};

/// An in-memory span exporter that keeps finished spans for inspection.
///
/// Clones share the same storage, so a test can hand one clone to the
/// pipeline and keep another to assert on.
///
/// # Example
///
/// ```
/// use app_obs::trace::{InMemorySpanExporter, SimpleSpanProcessor};
/// use app_obs::Telemetry;
///
/// let exporter = InMemorySpanExporter::default();
/// let telemetry = Telemetry::builder()
///     .with_span_processor(SimpleSpanProcessor::new(exporter.clone()))
///     .build();
///
/// let obs = telemetry.background();
/// let (_child, guard) = obs.start_span("load-config", vec![]);
/// guard.end();
///
/// let spans = exporter.get_finished_spans().unwrap();
/// assert_eq!(spans[0].name, "load-config");
/// ```
#[derive(Clone, Debug)]
pub struct InMemorySpanExporter {
    spans: Arc<Mutex<Vec<SpanData>>>,
    should_reset_on_shutdown: bool,
}

impl Default for InMemorySpanExporter {
    fn default() -> Self {
        InMemorySpanExporterBuilder::new().build()
    }
}

/// Builder for [`InMemorySpanExporter`].
#[derive(Clone, Debug)]
pub struct InMemorySpanExporterBuilder {
    should_reset_on_shutdown: bool,
}

impl Default for InMemorySpanExporterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySpanExporterBuilder {
    /// Creates a new builder. Spans are kept after shutdown unless
    /// [`with_reset_on_shutdown`](Self::with_reset_on_shutdown) is set.
    pub fn new() -> Self {
        Self {
            should_reset_on_shutdown: false,
        }
    }

    /// Clears the stored spans when the exporter shuts down.
    pub fn with_reset_on_shutdown(self) -> Self {
        Self {
            should_reset_on_shutdown: true,
        }
    }

    /// Creates the exporter.
    pub fn build(&self) -> InMemorySpanExporter {
        InMemorySpanExporter {
            spans: Arc::new(Mutex::new(Vec::new())),
            should_reset_on_shutdown: self.should_reset_on_shutdown,
        }
    }
}

impl InMemorySpanExporter {
    /// Returns the spans exported so far, in export order.
    pub fn get_finished_spans(&self) -> Result<Vec<SpanData>, TelemetryError> {
        Ok(self.spans.lock()?.clone())
    }

    /// Returns the finished spans with the given name.
    pub fn spans_named(&self, name: &str) -> Result<Vec<SpanData>, TelemetryError> {
        Ok(self
            .spans
            .lock()?
            .iter()
            .filter(|span| span.name == name)
            .cloned()
            .collect())
    }

    /// Clears the stored spans.
    pub fn reset(&self) {
        let _ = self.spans.lock().map(|mut spans| spans.clear());
    }
}

impl SpanExporter for InMemorySpanExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        let result = self
            .spans
            .lock()
            .map(|mut spans| spans.extend(batch))
            .map_err(TelemetryError::from);
        Box::pin(std::future::ready(result))
    }

    fn shutdown(&mut self) -> TelemetryResult {
        if self.should_reset_on_shutdown {
            self.reset();
        }
        Ok(())
    }
}
