use crate::common::{stdout_writer, SharedWriter};
use crate::trace::transform;
use app_obs::trace::SpanData;
use app_obs::{ExportResult, TelemetryError, TelemetryResult};
use core::fmt;
use futures_util::future::BoxFuture;
use std::io::Write;
use std::sync::atomic;
use std::sync::Arc;

/// An exporter that writes each batch of spans as one line of JSON.
///
/// Spans are grouped by resource:
///
/// ```text
/// {"resourceSpans":[{"resource":{"attributes":[...]},"spans":[{"traceId":"...",...}]}]}
/// ```
pub struct SpanExporter {
    writer: SharedWriter,
    pretty: bool,
    is_shutdown: atomic::AtomicBool,
}

impl fmt::Debug for SpanExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SpanExporter")
    }
}

impl Default for SpanExporter {
    fn default() -> Self {
        SpanExporter::builder().build()
    }
}

impl SpanExporter {
    /// Configure the exporter's output.
    pub fn builder() -> SpanExporterBuilder {
        SpanExporterBuilder::default()
    }

    fn write_batch(&self, batch: Vec<SpanData>) -> ExportResult {
        let data = transform::SpanData::from(batch);
        let mut writer = self.writer.lock()?;
        let encoded = if self.pretty {
            serde_json::to_writer_pretty(&mut *writer, &data)
        } else {
            serde_json::to_writer(&mut *writer, &data)
        };
        encoded.map_err(|err| TelemetryError::InternalFailure(err.to_string()))?;
        writeln!(writer).map_err(|err| TelemetryError::InternalFailure(err.to_string()))
    }
}

impl app_obs::trace::SpanExporter for SpanExporter {
    /// Write spans as JSON
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        let result = if self.is_shutdown.load(atomic::Ordering::SeqCst) {
            Err(TelemetryError::AlreadyShutdown)
        } else {
            self.write_batch(batch)
        };
        Box::pin(futures_util::future::ready(result))
    }

    fn force_flush(&mut self) -> TelemetryResult {
        self.writer
            .lock()?
            .flush()
            .map_err(|err| TelemetryError::InternalFailure(err.to_string()))
    }

    fn shutdown(&mut self) -> TelemetryResult {
        self.is_shutdown.store(true, atomic::Ordering::SeqCst);
        self.force_flush()
    }
}

/// Configuration for [`SpanExporter`].
#[derive(Default)]
pub struct SpanExporterBuilder {
    writer: Option<Box<dyn Write + Send + Sync>>,
    pretty: bool,
}

impl fmt::Debug for SpanExporterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanExporterBuilder")
            .field("pretty", &self.pretty)
            .finish()
    }
}

impl SpanExporterBuilder {
    /// Writes to `writer` instead of stdout.
    pub fn with_writer<W: Write + Send + Sync + 'static>(mut self, writer: W) -> Self {
        self.writer = Some(Box::new(writer));
        self
    }

    /// Indents the JSON output over several lines.
    pub fn with_pretty_print(mut self) -> Self {
        self.pretty = true;
        self
    }

    /// Creates the exporter.
    pub fn build(self) -> SpanExporter {
        SpanExporter {
            writer: self
                .writer
                .map_or_else(stdout_writer, |writer| Arc::new(std::sync::Mutex::new(writer))),
            pretty: self.pretty,
            is_shutdown: atomic::AtomicBool::new(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::tests::SharedBuffer;
    use app_obs::trace::{SimpleSpanProcessor, Status};
    use app_obs::{KeyValue, Resource, Telemetry};

    #[test]
    fn exports_one_json_line_per_batch() {
        let buffer = SharedBuffer::default();
        let telemetry = Telemetry::builder()
            .with_resource(Resource::builder().with_service_name("catalog").build())
            .with_span_processor(SimpleSpanProcessor::new(
                SpanExporter::builder().with_writer(buffer.clone()).build(),
            ))
            .build();

        let obs = telemetry.background();
        let (child, guard) = obs.start_span("fetch-item", vec![KeyValue::new("productID", 7)]);
        child.log().info("cache miss");
        guard.end_with_status(Status::error("not found"));
        telemetry.shutdown().unwrap();

        let output = buffer.contents();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 1);

        let json: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        let resource_spans = &json["resourceSpans"][0];
        assert_eq!(
            resource_spans["resource"]["attributes"][0]["value"]["stringValue"],
            "catalog"
        );
        let span = &resource_spans["spans"][0];
        assert_eq!(span["name"], "fetch-item");
        assert_eq!(span["parentSpanId"], "");
        assert_eq!(span["attributes"][0]["key"], "productID");
        assert_eq!(span["attributes"][0]["value"]["intValue"], 7);
        assert_eq!(span["events"][0]["name"], "cache miss");
        assert_eq!(span["status"]["code"], 1);
        assert_eq!(span["status"]["message"], "not found");
    }

    #[test]
    fn export_after_shutdown_fails() {
        use app_obs::trace::SpanExporter as _;

        let mut exporter = SpanExporter::builder()
            .with_writer(SharedBuffer::default())
            .build();
        exporter.shutdown().unwrap();
        let result = futures_util::FutureExt::now_or_never(exporter.export(vec![]));
        assert!(matches!(result, Some(Err(TelemetryError::AlreadyShutdown))));
    }
}
