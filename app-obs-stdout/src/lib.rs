//! Write app-obs spans and logs as JSON.
//!
//! [`SpanExporter`] writes one JSON document per exported batch and
//! [`LogSink`] writes one JSON object per log record, both to stdout unless
//! another writer is configured.
//!
//! # Examples
//!
//! ```no_run
//! use app_obs::Telemetry;
//!
//! let telemetry = Telemetry::builder()
//!     .with_batch_exporter(app_obs_stdout::SpanExporter::default())
//!     .with_log_sink(app_obs_stdout::LogSink::default())
//!     .build();
//!
//! telemetry.background().log().info("service started");
//!
//! // {"time":"2024-05-01 10:00:00.000","level":"INFO","msg":"service started","trace_id":"no-trace",...
//! ```
#![warn(missing_debug_implementations, missing_docs)]

pub(crate) mod common;

mod logs;
pub use logs::*;

mod trace;
pub use trace::*;
