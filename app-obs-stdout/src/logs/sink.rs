use crate::common::{stdout_writer, SharedWriter};
use crate::logs::transform::to_json;
use app_obs::logs::LogRecord;
use app_obs::{TelemetryError, TelemetryResult};
use core::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// A log sink writing one JSON object per line.
///
/// ```text
/// {"time":"2024-05-01 10:00:00.000","level":"INFO","msg":"fetching item","trace_id":"4bf92f...","span_id":"00f067...","source":{"file":"src/main.rs","line":12},"productID":42}
/// ```
pub struct LogSink {
    writer: SharedWriter,
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LogSink")
    }
}

impl Default for LogSink {
    fn default() -> Self {
        LogSink::builder().build()
    }
}

impl LogSink {
    /// Configure the sink's output.
    pub fn builder() -> LogSinkBuilder {
        LogSinkBuilder::default()
    }
}

impl app_obs::logs::LogSink for LogSink {
    fn write(&self, record: &LogRecord) -> TelemetryResult {
        let mut line = serde_json::to_vec(&to_json(record))
            .map_err(|err| TelemetryError::InternalFailure(err.to_string()))?;
        line.push(b'\n');
        self.writer
            .lock()?
            .write_all(&line)
            .map_err(|err| TelemetryError::InternalFailure(err.to_string()))
    }

    fn flush(&self) -> TelemetryResult {
        self.writer
            .lock()?
            .flush()
            .map_err(|err| TelemetryError::InternalFailure(err.to_string()))
    }
}

/// Configuration for [`LogSink`].
#[derive(Default)]
pub struct LogSinkBuilder {
    writer: Option<Box<dyn Write + Send + Sync>>,
}

impl fmt::Debug for LogSinkBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LogSinkBuilder")
    }
}

impl LogSinkBuilder {
    /// Writes to `writer` instead of stdout.
    pub fn with_writer<W: Write + Send + Sync + 'static>(mut self, writer: W) -> Self {
        self.writer = Some(Box::new(writer));
        self
    }

    /// Creates the sink.
    pub fn build(self) -> LogSink {
        LogSink {
            writer: self
                .writer
                .map_or_else(stdout_writer, |writer| Arc::new(Mutex::new(writer))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::tests::SharedBuffer;
    use app_obs::logs::FieldValue;
    use app_obs::trace::InMemorySpanExporter;
    use app_obs::Telemetry;
    use rstest::rstest;

    #[rstest]
    #[case::inside_a_span(true)]
    #[case::outside_any_span(false)]
    fn records_carry_correlation_ids(#[case] in_span: bool) {
        let buffer = SharedBuffer::default();
        let telemetry = Telemetry::builder()
            .with_simple_exporter(InMemorySpanExporter::default())
            .with_log_sink(LogSink::builder().with_writer(buffer.clone()).build())
            .build();

        let background = telemetry.background();
        let (obs, _guard) = if in_span {
            let (obs, guard) = background.start_span("handle-request", vec![]);
            (obs, Some(guard))
        } else {
            (background, None)
        };
        obs.log()
            .with([("productID", FieldValue::from(42))])
            .info("fetching item");

        let output = buffer.contents();
        let json: serde_json::Value = serde_json::from_str(output.trim_end()).unwrap();
        assert_eq!(json["msg"], "fetching item");
        assert_eq!(json["productID"], 42);
        assert_eq!(json["trace_id"], obs.trace_id());
        assert_eq!(json["span_id"], obs.span_id());
        assert_eq!(json["trace_id"] == "no-trace", !in_span);
        assert_eq!(json["source"]["file"], file!());
    }
}
