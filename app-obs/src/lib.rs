//! Request-scoped trace context and span-correlated structured logging.
//!
//! `app-obs` ties three things together for every request a service
//! handles:
//!
//! * the **trace position** of the request, continued from inbound headers
//!   and written into outbound ones ([`propagation`]);
//! * **spans** for each layer the request passes through, ended on every exit
//!   path by a [`SpanGuard`](trace::SpanGuard) ([`trace`]);
//! * **logs** that carry the ids of the active span and are mirrored onto it,
//!   so an error logged deep in a call chain shows up on the span that failed
//!   ([`logs`]).
//!
//! All of it hangs off an [`Observability`] handle created per request from
//! the process-wide [`Telemetry`]:
//!
//! ```
//! use app_obs::logs::FieldValue;
//! use app_obs::trace::InMemorySpanExporter;
//! use app_obs::Telemetry;
//!
//! let exporter = InMemorySpanExporter::default();
//! let telemetry = Telemetry::builder()
//!     .with_simple_exporter(exporter.clone())
//!     .build();
//!
//! let headers = http::HeaderMap::new();
//! let obs = telemetry.observability_from_headers(&headers);
//!
//! let (obs, _request) = obs.start_span("handle-request", vec![]);
//! obs.in_span("fetch-item", vec![], |obs| {
//!     obs.log()
//!         .with([("productID", FieldValue::from(42))])
//!         .info("fetching item");
//! });
//! ```
//!
//! ## Crate Feature Flags
//!
//! * `internal-logs` (enabled by default): diagnostics about the pipeline
//!   itself, such as a span ended twice or a full export queue, are emitted
//!   as `tracing` events.
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]

#[macro_use]
mod internal_logging;

#[doc(hidden)]
pub mod _private {
    pub use tracing::{debug, error, info, warn};
}

mod common;
mod config;
mod context;
mod error;
mod handle;
pub mod logs;
pub mod propagation;
mod resource;
mod telemetry;
pub mod trace;

pub use common::{Key, KeyValue, Value};
pub use config::{ApmType, ObservabilityConfig};
pub use context::{Context, ContextGuard, FutureContextExt, WithContext};
pub use error::{ExportResult, TelemetryError, TelemetryResult};
pub use handle::Observability;
pub use logs::ErrorPropagation;
pub use resource::{Resource, ResourceBuilder};
pub use telemetry::{Telemetry, TelemetryBuilder};
