use crate::error::TelemetryResult;
use crate::logs::{Level, LogRecord, LogSink};
use std::fmt::Write;

/// Forwards log records to the `tracing` subscriber installed by the
/// application.
///
/// Records are emitted under the `app_obs::log` target with `trace_id`,
/// `span_id`, the caller's `source` as `file:line` and the record fields
/// rendered as `key=value` pairs.
#[derive(Clone, Debug, Default)]
pub struct TracingLogSink {
    _private: (),
}

impl TracingLogSink {
    /// Creates the sink.
    pub fn new() -> Self {
        TracingLogSink::default()
    }
}

fn render_fields(record: &LogRecord) -> String {
    let mut rendered = String::new();
    for field in &record.fields {
        if !rendered.is_empty() {
            rendered.push(' ');
        }
        let _ = write!(rendered, "{}={}", field.key, field.value);
    }
    rendered
}

fn render_source(record: &LogRecord) -> String {
    record
        .source
        .map(|location| format!("{}:{}", location.file(), location.line()))
        .unwrap_or_default()
}

impl LogSink for TracingLogSink {
    fn write(&self, record: &LogRecord) -> TelemetryResult {
        let trace_id = record.trace_id_or_sentinel();
        let span_id = record.span_id_or_sentinel();
        let fields = render_fields(record);
        let source = render_source(record);
        let message = record.message.as_ref();
        match record.level {
            Level::Debug => tracing::debug!(
                target: "app_obs::log",
                trace_id = %trace_id,
                span_id = %span_id,
                source = %source,
                fields = %fields,
                "{message}"
            ),
            Level::Info => tracing::info!(
                target: "app_obs::log",
                trace_id = %trace_id,
                span_id = %span_id,
                source = %source,
                fields = %fields,
                "{message}"
            ),
            Level::Warn => tracing::warn!(
                target: "app_obs::log",
                trace_id = %trace_id,
                span_id = %span_id,
                source = %source,
                fields = %fields,
                "{message}"
            ),
            Level::Error => tracing::error!(
                target: "app_obs::log",
                trace_id = %trace_id,
                span_id = %span_id,
                source = %source,
                fields = %fields,
                "{message}"
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::Field;
    use std::time::SystemTime;

    #[test]
    fn fields_render_in_order() {
        let record = LogRecord {
            timestamp: SystemTime::now(),
            level: Level::Info,
            message: "hello".into(),
            fields: vec![Field::new("a", 1), Field::new("b", "two")],
            trace_id: None,
            span_id: None,
            source: None,
        };
        assert_eq!(render_fields(&record), "a=1 b=two");
        assert_eq!(render_source(&record), "");
        assert!(TracingLogSink::new().write(&record).is_ok());
    }

    #[test]
    fn source_renders_file_and_line() {
        let location = std::panic::Location::caller();
        let record = LogRecord {
            timestamp: SystemTime::now(),
            level: Level::Warn,
            message: "located".into(),
            fields: Vec::new(),
            trace_id: None,
            span_id: None,
            source: Some(location),
        };
        assert_eq!(
            render_source(&record),
            format!("{}:{}", file!(), location.line())
        );
    }
}
