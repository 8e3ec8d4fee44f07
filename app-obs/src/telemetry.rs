//! The process-wide telemetry pipeline.
//!
//! A [`Telemetry`] bundles everything shared by all requests of a process:
//! the resource, the tracer backend chosen from [`ApmType`], the span
//! processors, the propagator and the log sink. It is cheap to clone and is
//! normally built once at startup:
//!
//! ```
//! use app_obs::trace::InMemorySpanExporter;
//! use app_obs::{ApmType, ObservabilityConfig, Telemetry};
//!
//! let config = ObservabilityConfig::default()
//!     .with_service_name("product-detail")
//!     .with_apm_type(ApmType::Otlp);
//!
//! let telemetry = Telemetry::builder()
//!     .with_config(&config)
//!     .with_simple_exporter(InMemorySpanExporter::default())
//!     .build();
//!
//! telemetry.background().log().info("service started");
//! telemetry.shutdown().unwrap();
//! ```
//!
//! Dropping the last clone shuts the pipeline down if that was not done
//! explicitly.
use crate::config::{ApmType, ObservabilityConfig, OBS_SHUTDOWN_TIMEOUT_DEFAULT};
use crate::error::{TelemetryError, TelemetryResult};
use crate::handle::Observability;
use crate::logs::{CorrelatedLogger, ErrorPropagation, Level, LogSink, TracingLogSink};
use crate::propagation::{
    DatadogPropagator, Extractor, HeaderExtractor, TextMapPropagator, TraceContextPropagator,
};
use crate::resource::Resource;
use crate::trace::{
    BatchSpanProcessor, BoxedTracer, DatadogIdGenerator, IdGenerator, NoopTracer,
    RandomIdGenerator, RecordingTracer, SimpleSpanProcessor, SpanExporter, SpanPipeline,
    SpanProcessor, TaggingTracer,
};
use crate::Context;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

static DISABLED: OnceLock<Telemetry> = OnceLock::new();

/// Shared, process-wide telemetry backends.
#[derive(Clone)]
pub struct Telemetry {
    inner: Arc<TelemetryInner>,
}

struct TelemetryInner {
    apm_type: ApmType,
    pipeline: Arc<SpanPipeline>,
    tracer: BoxedTracer,
    propagator: Arc<dyn TextMapPropagator>,
    log_sink: Arc<dyn LogSink>,
    min_level: Level,
    error_propagation: ErrorPropagation,
    shutdown_timeout: Duration,
}

impl TelemetryInner {
    fn shutdown(&self) -> TelemetryResult {
        let pipeline_result = self.pipeline.shutdown_with_timeout(self.shutdown_timeout);
        let sink_result = self.log_sink.flush();
        if let Err(err) = &sink_result {
            obs_debug!(name: "Telemetry.SinkFlushError", error = err.to_string());
        }
        pipeline_result.and(sink_result)
    }
}

impl Drop for TelemetryInner {
    fn drop(&mut self) {
        if !self.pipeline.is_shutdown() {
            if let Err(err) = self.shutdown() {
                obs_debug!(name: "Telemetry.Drop.ShutdownError", error = err.to_string());
            }
        } else {
            obs_debug!(
                name: "Telemetry.Drop.AlreadyShutdown",
                message = "Telemetry was already shut down; drop will not attempt shutdown again."
            );
        }
    }
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("apm_type", &self.inner.apm_type)
            .field("tracer", &self.inner.tracer)
            .field("propagator", &self.inner.propagator)
            .field("log_sink", &self.inner.log_sink)
            .field("min_level", &self.inner.min_level)
            .field("error_propagation", &self.inner.error_propagation)
            .finish()
    }
}

impl Telemetry {
    /// Starts configuring a telemetry pipeline.
    pub fn builder() -> TelemetryBuilder {
        TelemetryBuilder::default()
    }

    /// A process-wide pipeline that records nothing and logs through
    /// [`TracingLogSink`]. Used by handles that could not be found in their
    /// ambient context.
    pub fn disabled() -> Telemetry {
        DISABLED
            .get_or_init(|| Telemetry::builder().with_apm_type(ApmType::None).build())
            .clone()
    }

    /// A handle for work that is not part of any request, such as startup
    /// and shutdown logging. Spans started from it are roots.
    pub fn background(&self) -> Observability {
        Observability::new(self.clone(), Context::new())
    }

    /// A handle continuing the trace described by `extractor`, typically the
    /// headers of an inbound request.
    ///
    /// Missing or malformed trace headers yield a handle equivalent to
    /// [`background`](Telemetry::background).
    pub fn observability_from_extractor(&self, extractor: &dyn Extractor) -> Observability {
        let cx = self.inner.propagator.extract(extractor);
        Observability::new(self.clone(), cx)
    }

    /// A handle continuing the trace carried by inbound HTTP headers.
    pub fn observability_from_headers(&self, headers: &http::HeaderMap) -> Observability {
        self.observability_from_extractor(&HeaderExtractor(headers))
    }

    /// The backend spans are recorded for.
    pub fn apm_type(&self) -> ApmType {
        self.inner.apm_type
    }

    /// The resource every span is exported with.
    pub fn resource(&self) -> &Resource {
        self.inner.pipeline.resource()
    }

    /// The propagator used for inbound and outbound headers.
    pub fn propagator(&self) -> &dyn TextMapPropagator {
        self.inner.propagator.as_ref()
    }

    pub(crate) fn tracer(&self) -> &BoxedTracer {
        &self.inner.tracer
    }

    pub(crate) fn logger(&self, cx: Context) -> CorrelatedLogger {
        CorrelatedLogger::new(self.inner.log_sink.clone(), cx)
            .with_min_level(self.inner.min_level)
            .with_error_propagation(self.inner.error_propagation)
    }

    /// Exports every span finished so far and flushes the log sink.
    pub fn force_flush(&self) -> TelemetryResult {
        let pipeline_result = self.inner.pipeline.force_flush();
        pipeline_result.and(self.inner.log_sink.flush())
    }

    /// Flushes and closes the span processors and the log sink.
    ///
    /// Blocks until every processor finished or the configured shutdown
    /// timeout elapsed. Spans ended afterwards are not recorded. Calling it a
    /// second time returns [`TelemetryError::AlreadyShutdown`].
    pub fn shutdown(&self) -> TelemetryResult {
        if self.inner.pipeline.is_shutdown() {
            return Err(TelemetryError::AlreadyShutdown);
        }
        let result = self.inner.shutdown();
        if let Err(err) = &result {
            obs_warn!(name: "Telemetry.ShutdownError", error = err.to_string());
        }
        result
    }
}

/// Builder for [`Telemetry`].
pub struct TelemetryBuilder {
    apm_type: ApmType,
    resource: Option<Resource>,
    processors: Vec<Arc<dyn SpanProcessor>>,
    id_generator: Option<Box<dyn IdGenerator>>,
    propagator: Option<Arc<dyn TextMapPropagator>>,
    log_sink: Option<Arc<dyn LogSink>>,
    min_level: Level,
    error_propagation: ErrorPropagation,
    shutdown_timeout: Duration,
}

impl Default for TelemetryBuilder {
    fn default() -> Self {
        TelemetryBuilder {
            apm_type: ApmType::default(),
            resource: None,
            processors: Vec::new(),
            id_generator: None,
            propagator: None,
            log_sink: None,
            min_level: Level::default(),
            error_propagation: ErrorPropagation::default(),
            shutdown_timeout: Duration::from_millis(OBS_SHUTDOWN_TIMEOUT_DEFAULT),
        }
    }
}

impl fmt::Debug for TelemetryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryBuilder")
            .field("apm_type", &self.apm_type)
            .field("resource", &self.resource)
            .field("processors", &self.processors.len())
            .field("min_level", &self.min_level)
            .finish()
    }
}

impl TelemetryBuilder {
    /// Applies backend, resource, log level, error policy and shutdown
    /// timeout from `config`.
    pub fn with_config(self, config: &ObservabilityConfig) -> Self {
        self.with_apm_type(config.apm_type)
            .with_resource(config.resource())
            .with_min_level(config.log_level)
            .with_error_propagation(config.error_propagation)
            .with_shutdown_timeout(config.shutdown_timeout)
    }

    /// Selects the tracer backend. It also decides the default propagator
    /// and id generator.
    pub fn with_apm_type(mut self, apm_type: ApmType) -> Self {
        self.apm_type = apm_type;
        self
    }

    /// Sets the resource attached to every span.
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Adds a span processor.
    pub fn with_span_processor<P: SpanProcessor + 'static>(mut self, processor: P) -> Self {
        self.processors.push(Arc::new(processor));
        self
    }

    /// Exports every span synchronously as it ends.
    pub fn with_simple_exporter<E: SpanExporter + 'static>(self, exporter: E) -> Self {
        self.with_span_processor(SimpleSpanProcessor::new(exporter))
    }

    /// Exports spans in batches from a background thread, configured from
    /// the `OBS_BSP_*` environment variables.
    pub fn with_batch_exporter<E: SpanExporter + 'static>(self, exporter: E) -> Self {
        self.with_span_processor(BatchSpanProcessor::builder(exporter).build())
    }

    /// Overrides the id generator.
    pub fn with_id_generator<G: IdGenerator + 'static>(mut self, id_generator: G) -> Self {
        self.id_generator = Some(Box::new(id_generator));
        self
    }

    /// Overrides the propagator.
    pub fn with_propagator<P: TextMapPropagator + 'static>(mut self, propagator: P) -> Self {
        self.propagator = Some(Arc::new(propagator));
        self
    }

    /// Sets where application logs are written. Defaults to
    /// [`TracingLogSink`].
    pub fn with_log_sink<S: LogSink + 'static>(mut self, sink: S) -> Self {
        self.log_sink = Some(Arc::new(sink));
        self
    }

    /// Sets the minimum log level.
    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    /// Sets how far logged errors mark spans as failed.
    pub fn with_error_propagation(mut self, policy: ErrorPropagation) -> Self {
        self.error_propagation = policy;
        self
    }

    /// Sets the deadline of [`Telemetry::shutdown`].
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Creates the pipeline.
    pub fn build(self) -> Telemetry {
        let apm_type = self.apm_type;
        let id_generator = self.id_generator.unwrap_or_else(|| match apm_type {
            ApmType::Datadog => Box::new(DatadogIdGenerator::default()),
            ApmType::Otlp | ApmType::None => Box::new(RandomIdGenerator::default()),
        });
        let propagator = self.propagator.unwrap_or_else(|| match apm_type {
            ApmType::Datadog => Arc::new(DatadogPropagator::new()),
            ApmType::Otlp | ApmType::None => Arc::new(TraceContextPropagator::new()),
        });
        let pipeline = Arc::new(SpanPipeline::new(
            self.processors,
            Arc::new(self.resource.unwrap_or_default()),
            id_generator,
        ));
        let tracer = match apm_type {
            ApmType::Otlp => BoxedTracer::new(RecordingTracer::new(pipeline.clone())),
            ApmType::Datadog => BoxedTracer::new(TaggingTracer::new(pipeline.clone())),
            ApmType::None => BoxedTracer::new(NoopTracer::new()),
        };

        obs_debug!(
            name: "Telemetry.Built",
            apm_type = apm_type.as_str(),
            min_level = self.min_level.as_str()
        );

        Telemetry {
            inner: Arc::new(TelemetryInner {
                apm_type,
                pipeline,
                tracer,
                propagator,
                log_sink: self.log_sink.unwrap_or_else(|| Arc::new(TracingLogSink::new())),
                min_level: self.min_level,
                error_propagation: self.error_propagation,
                shutdown_timeout: self.shutdown_timeout,
            }),
        }
    }
}
