//! # Span-correlated structured logging
//!
//! A [`CorrelatedLogger`] writes [`LogRecord`]s to a [`LogSink`] and, when a
//! span is recording in its context, mirrors them onto that span:
//!
//! | level   | sink | span                                                   |
//! |---------|------|--------------------------------------------------------|
//! | `debug` | yes  | nothing                                                |
//! | `info`  | yes  | event named after the message                          |
//! | `warn`  | yes  | event named after the message                          |
//! | `error` | yes  | error record and `Error` status                        |
//!
//! Every record carries the trace and span id of the logger's context, or
//! the [`NO_TRACE`] / [`NO_SPAN`] sentinels when there is none.
use crate::common::Key;
use crate::error::{TelemetryError, TelemetryResult};
use crate::trace::{SpanId, TraceId};
use std::borrow::Cow;
use std::error::Error;
use std::fmt;
use std::panic::Location;
use std::str::FromStr;
use std::sync::Arc;
use std::time::SystemTime;

mod in_memory_sink;
mod logger;
mod tracing_sink;

pub use in_memory_sink::InMemoryLogSink;
pub use logger::{CorrelatedLogger, ErrorPropagation};
pub use tracing_sink::TracingLogSink;

/// Trace id written for records logged outside of any trace.
pub const NO_TRACE: &str = "no-trace";
/// Span id written for records logged outside of any span.
pub const NO_SPAN: &str = "no-span";
/// Name of the field checked for an error value by error-level logs.
pub const ERROR_FIELD: &str = "error";

/// Severity of a log record, ordered `Debug < Info < Warn < Error`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Level {
    /// Diagnostic detail, never mirrored onto spans.
    Debug,
    /// Normal operation.
    #[default]
    Info,
    /// Something unexpected that the operation recovered from.
    Warn,
    /// A failed operation.
    Error,
}

impl Level {
    /// Upper-case name, as written by sinks.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            other => Err(TelemetryError::InvalidConfig(format!(
                "unknown log level {other:?}"
            ))),
        }
    }
}

/// The value of a structured log field.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum FieldValue {
    /// String values
    Str(Cow<'static, str>),
    /// i64 values
    I64(i64),
    /// f64 values
    F64(f64),
    /// bool values
    Bool(bool),
    /// An error object, kept intact so it can be recorded on a span.
    Error(Arc<dyn Error + Send + Sync>),
}

impl FieldValue {
    /// Wraps an error.
    ///
    /// # Examples
    ///
    /// ```
    /// use app_obs::logs::FieldValue;
    ///
    /// let err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
    /// let value = FieldValue::error(err);
    /// assert_eq!(value.to_string(), "not found");
    /// ```
    pub fn error<E: Error + Send + Sync + 'static>(err: E) -> Self {
        FieldValue::Error(Arc::new(err))
    }

    /// The error held by this value, if any.
    pub fn as_error(&self) -> Option<&Arc<dyn Error + Send + Sync>> {
        match self {
            FieldValue::Error(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(v) => f.write_str(v),
            FieldValue::I64(v) => v.fmt(f),
            FieldValue::F64(v) => v.fmt(f),
            FieldValue::Bool(v) => v.fmt(f),
            FieldValue::Error(err) => err.fmt(f),
        }
    }
}

impl From<&'static str> for FieldValue {
    fn from(v: &'static str) -> Self {
        FieldValue::Str(Cow::Borrowed(v))
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(Cow::Owned(v))
    }
}

impl From<Cow<'static, str>> for FieldValue {
    fn from(v: Cow<'static, str>) -> Self {
        FieldValue::Str(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::I64(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::I64(v.into())
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::I64(v.into())
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::F64(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<Arc<dyn Error + Send + Sync>> for FieldValue {
    fn from(err: Arc<dyn Error + Send + Sync>) -> Self {
        FieldValue::Error(err)
    }
}

/// A named field of a log record.
#[derive(Clone, Debug)]
pub struct Field {
    /// The field name
    pub key: Key,
    /// The field value
    pub value: FieldValue,
}

impl Field {
    /// Create a new field.
    pub fn new(key: impl Into<Key>, value: impl Into<FieldValue>) -> Self {
        Field {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A single structured log line, as handed to a [`LogSink`].
#[derive(Clone, Debug)]
pub struct LogRecord {
    /// When the record was produced
    pub timestamp: SystemTime,
    /// Severity
    pub level: Level,
    /// Human readable message
    pub message: Cow<'static, str>,
    /// Fields in the order they were added: logger fields first, then call
    /// fields.
    pub fields: Vec<Field>,
    /// Trace of the logger's context, if any
    pub trace_id: Option<TraceId>,
    /// Span of the logger's context, if any
    pub span_id: Option<SpanId>,
    /// Where in the source code the record was logged
    pub source: Option<&'static Location<'static>>,
}

impl LogRecord {
    /// Hex trace id, or [`NO_TRACE`].
    pub fn trace_id_or_sentinel(&self) -> Cow<'static, str> {
        self.trace_id
            .map_or(Cow::Borrowed(NO_TRACE), |id| Cow::Owned(id.to_string()))
    }

    /// Hex span id, or [`NO_SPAN`].
    pub fn span_id_or_sentinel(&self) -> Cow<'static, str> {
        self.span_id
            .map_or(Cow::Borrowed(NO_SPAN), |id| Cow::Owned(id.to_string()))
    }

    /// The value of the last field named `key`.
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .rev()
            .find(|field| field.key.as_str() == key)
            .map(|field| &field.value)
    }

    /// The last error value stored under [`ERROR_FIELD`].
    pub fn error(&self) -> Option<&Arc<dyn Error + Send + Sync>> {
        self.fields
            .iter()
            .rev()
            .filter(|field| field.key.as_str() == ERROR_FIELD)
            .find_map(|field| field.value.as_error())
    }
}

/// Destination of log records.
///
/// Sinks are shared by every logger of the process and must be cheap to call
/// from many threads. A failing write is reported through internal
/// diagnostics and never reaches the code that logged.
pub trait LogSink: Send + Sync + fmt::Debug {
    /// Writes one record.
    fn write(&self, record: &LogRecord) -> TelemetryResult;

    /// Flushes buffered records.
    fn flush(&self) -> TelemetryResult {
        Ok(())
    }
}
