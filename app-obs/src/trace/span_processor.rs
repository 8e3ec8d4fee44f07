//! # Span processors
//!
//! Span processors receive every finished span and decide when it reaches a
//! [`SpanExporter`]:
//!
//! * [`SimpleSpanProcessor`] exports each span synchronously as it ends. It
//!   is meant for tests and debugging.
//! * [`BatchSpanProcessor`] queues spans in a bounded channel and exports
//!   them in batches from a dedicated thread, so ending a span never waits on
//!   I/O. When the queue is full new spans are dropped and counted.
//!
//! ```ascii
//!   +-----+--------------+   +-----------------------+   +-------------------+
//!   |     |              |   |                       |   |                   |
//!   | SDK | Span::end()  +---> (Batch)SpanProcessor  +--->  (Stdout)Exporter |
//!   |     |              |   |                       |   |                   |
//!   +-----+--------------+   +-----------------------+   +-------------------+
//! ```
use crate::error::{TelemetryError, TelemetryResult};
use crate::trace::{SpanData, SpanExporter};
use futures_executor::block_on;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Delay interval between two consecutive exports.
pub(crate) const OBS_BSP_SCHEDULE_DELAY: &str = "OBS_BSP_SCHEDULE_DELAY";
/// Default delay interval between two consecutive exports.
pub(crate) const OBS_BSP_SCHEDULE_DELAY_DEFAULT: u64 = 5_000;
/// Maximum queue size
pub(crate) const OBS_BSP_MAX_QUEUE_SIZE: &str = "OBS_BSP_MAX_QUEUE_SIZE";
/// Default maximum queue size
pub(crate) const OBS_BSP_MAX_QUEUE_SIZE_DEFAULT: usize = 2_048;
/// Maximum batch size, must be less than or equal to OBS_BSP_MAX_QUEUE_SIZE
pub(crate) const OBS_BSP_MAX_EXPORT_BATCH_SIZE: &str = "OBS_BSP_MAX_EXPORT_BATCH_SIZE";
/// Default maximum batch size
pub(crate) const OBS_BSP_MAX_EXPORT_BATCH_SIZE_DEFAULT: usize = 512;
/// Maximum time to wait for a flush to finish.
pub(crate) const OBS_BSP_EXPORT_TIMEOUT: &str = "OBS_BSP_EXPORT_TIMEOUT";
/// Default maximum time to wait for a flush to finish.
pub(crate) const OBS_BSP_EXPORT_TIMEOUT_DEFAULT: u64 = 30_000;

/// Default time allowed for a shutdown to drain the pipeline.
pub(crate) const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Receives finished spans and forwards them to an exporter.
pub trait SpanProcessor: Send + Sync + fmt::Debug {
    /// Called synchronously from `Span::end`; must not block.
    fn on_end(&self, span: SpanData);

    /// Exports every span received so far.
    fn force_flush(&self) -> TelemetryResult;

    /// Flushes remaining spans and releases the exporter, waiting at most
    /// `timeout`.
    ///
    /// Calling it a second time returns [`TelemetryError::AlreadyShutdown`].
    fn shutdown_with_timeout(&self, timeout: Duration) -> TelemetryResult;

    /// Shuts down with the default timeout.
    fn shutdown(&self) -> TelemetryResult {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT)
    }
}

/// A [`SpanProcessor`] that exports each span as soon as it ends.
#[derive(Debug)]
pub struct SimpleSpanProcessor {
    exporter: Mutex<Box<dyn SpanExporter>>,
    is_shutdown: AtomicBool,
}

impl SimpleSpanProcessor {
    /// Create a new [`SimpleSpanProcessor`] using the provided exporter.
    pub fn new<E: SpanExporter + 'static>(exporter: E) -> Self {
        SimpleSpanProcessor {
            exporter: Mutex::new(Box::new(exporter)),
            is_shutdown: AtomicBool::new(false),
        }
    }
}

impl SpanProcessor for SimpleSpanProcessor {
    fn on_end(&self, span: SpanData) {
        if self.is_shutdown.load(Ordering::Relaxed) {
            obs_debug!(name: "SimpleSpanProcessor.OnEnd.AfterShutdown");
            return;
        }

        let result = self
            .exporter
            .lock()
            .map_err(TelemetryError::from)
            .and_then(|mut exporter| block_on(exporter.export(vec![span])));

        if let Err(err) = result {
            obs_warn!(name: "SimpleSpanProcessor.ExportFailed", error = err.to_string());
        }
    }

    fn force_flush(&self) -> TelemetryResult {
        self.exporter.lock()?.force_flush()
    }

    fn shutdown_with_timeout(&self, _timeout: Duration) -> TelemetryResult {
        if self.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(TelemetryError::AlreadyShutdown);
        }
        self.exporter.lock()?.shutdown()
    }
}

enum ControlMessage {
    ExportBatchReady,
    ForceFlush(SyncSender<TelemetryResult>),
    Shutdown(SyncSender<TelemetryResult>),
}

/// A [`SpanProcessor`] that exports spans in batches from a dedicated thread.
///
/// Spans wait in a queue bounded by `max_queue_size`. The worker exports
/// whenever `max_export_batch_size` spans are queued, every
/// `scheduled_delay`, on [`force_flush`](SpanProcessor::force_flush) and on
/// shutdown. A full queue drops the newest span: the first drop is reported
/// as a warning and the total is reported at shutdown.
///
/// # Examples
///
/// ```
/// use app_obs::trace::{BatchConfigBuilder, BatchSpanProcessor, InMemorySpanExporter};
/// use std::time::Duration;
///
/// let exporter = InMemorySpanExporter::default();
/// let processor = BatchSpanProcessor::builder(exporter)
///     .with_batch_config(
///         BatchConfigBuilder::default()
///             .with_max_queue_size(4096)
///             .with_scheduled_delay(Duration::from_millis(200))
///             .build(),
///     )
///     .build();
/// # drop(processor);
/// ```
pub struct BatchSpanProcessor {
    span_sender: SyncSender<SpanData>,
    control_sender: SyncSender<ControlMessage>,
    handle: Mutex<Option<JoinHandle<()>>>,
    flush_timeout: Duration,
    is_shutdown: AtomicBool,
    dropped_span_count: Arc<AtomicUsize>,
    current_batch_size: Arc<AtomicUsize>,
    export_message_pending: Arc<AtomicBool>,
    max_export_batch_size: usize,
}

impl fmt::Debug for BatchSpanProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchSpanProcessor")
            .field("flush_timeout", &self.flush_timeout)
            .field("max_export_batch_size", &self.max_export_batch_size)
            .field("dropped_span_count", &self.dropped_spans())
            .finish()
    }
}

impl BatchSpanProcessor {
    /// Creates a new instance of `BatchSpanProcessor`.
    pub fn new<E>(exporter: E, config: BatchConfig) -> Self
    where
        E: SpanExporter + 'static,
    {
        let (span_sender, span_receiver) = mpsc::sync_channel(config.max_queue_size);
        let (control_sender, control_receiver) = mpsc::sync_channel(64);
        let current_batch_size = Arc::new(AtomicUsize::new(0));
        let export_message_pending = Arc::new(AtomicBool::new(false));

        let worker = BatchWorker {
            exporter: Box::new(exporter),
            spans: span_receiver,
            control: control_receiver,
            current_batch_size: current_batch_size.clone(),
            export_message_pending: export_message_pending.clone(),
            scheduled_delay: config.scheduled_delay,
            max_export_batch_size: config.max_export_batch_size,
        };

        let handle = thread::Builder::new()
            .name("BatchSpanProcessorThread".to_string())
            .spawn(move || worker.run());
        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(err) => {
                // The worker, and with it the receivers, are gone; every span
                // sent from now on is counted as dropped.
                obs_error!(name: "BatchSpanProcessor.ThreadSpawnFailed", error = err.to_string());
                None
            }
        };

        BatchSpanProcessor {
            span_sender,
            control_sender,
            handle: Mutex::new(handle),
            flush_timeout: config.flush_timeout,
            is_shutdown: AtomicBool::new(false),
            dropped_span_count: Arc::new(AtomicUsize::new(0)),
            current_batch_size,
            export_message_pending,
            max_export_batch_size: config.max_export_batch_size,
        }
    }

    /// Starts building a processor around `exporter`.
    pub fn builder<E>(exporter: E) -> BatchSpanProcessorBuilder<E>
    where
        E: SpanExporter + 'static,
    {
        BatchSpanProcessorBuilder {
            exporter,
            config: BatchConfig::default(),
        }
    }

    /// The number of spans dropped because the queue was full or closed.
    pub fn dropped_spans(&self) -> usize {
        self.dropped_span_count.load(Ordering::Relaxed)
    }

    fn record_drop(&self) {
        if self.dropped_span_count.fetch_add(1, Ordering::Relaxed) == 0 {
            obs_warn!(
                name: "BatchSpanProcessor.SpanDroppingStarted",
                message = "Span queue is full or closed; dropping spans. The total is reported at shutdown."
            );
        }
    }
}

impl SpanProcessor for BatchSpanProcessor {
    fn on_end(&self, span: SpanData) {
        if self.is_shutdown.load(Ordering::Relaxed) {
            self.record_drop();
            return;
        }

        // Counted before sending so the worker never decrements first.
        let queued = self.current_batch_size.fetch_add(1, Ordering::Relaxed) + 1;
        match self.span_sender.try_send(span) {
            Ok(()) => {
                if queued >= self.max_export_batch_size
                    && !self.export_message_pending.swap(true, Ordering::Relaxed)
                {
                    // A full control channel means the worker is already busy
                    // with messages that lead to an export anyway.
                    if self
                        .control_sender
                        .try_send(ControlMessage::ExportBatchReady)
                        .is_err()
                    {
                        self.export_message_pending.store(false, Ordering::Relaxed);
                    }
                }
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.current_batch_size.fetch_sub(1, Ordering::Relaxed);
                self.record_drop();
            }
        }
    }

    fn force_flush(&self) -> TelemetryResult {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return Err(TelemetryError::AlreadyShutdown);
        }
        let (sender, receiver) = mpsc::sync_channel(1);
        self.control_sender
            .try_send(ControlMessage::ForceFlush(sender))
            .map_err(|err| TelemetryError::InternalFailure(format!("failed to request flush: {err}")))?;

        receiver
            .recv_timeout(self.flush_timeout)
            .map_err(|_| TelemetryError::Timeout(self.flush_timeout))?
    }

    fn shutdown_with_timeout(&self, timeout: Duration) -> TelemetryResult {
        if self.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(TelemetryError::AlreadyShutdown);
        }

        let dropped = self.dropped_spans();
        if dropped > 0 {
            obs_warn!(
                name: "BatchSpanProcessor.SpansDropped",
                dropped_span_count = dropped,
                message = "Spans were dropped because the queue was full or closed."
            );
        }

        let (sender, receiver) = mpsc::sync_channel(1);
        self.control_sender
            .try_send(ControlMessage::Shutdown(sender))
            .map_err(|err| TelemetryError::InternalFailure(format!("failed to request shutdown: {err}")))?;

        let result = receiver
            .recv_timeout(timeout)
            .map_err(|_| TelemetryError::Timeout(timeout))?;
        if let Some(handle) = self.handle.lock()?.take() {
            if handle.join().is_err() {
                obs_error!(name: "BatchSpanProcessor.ThreadPanicked");
            }
        }
        result
    }
}

struct BatchWorker {
    exporter: Box<dyn SpanExporter>,
    spans: Receiver<SpanData>,
    control: Receiver<ControlMessage>,
    current_batch_size: Arc<AtomicUsize>,
    export_message_pending: Arc<AtomicBool>,
    scheduled_delay: Duration,
    max_export_batch_size: usize,
}

impl BatchWorker {
    fn run(mut self) {
        let mut last_export_time = Instant::now();
        loop {
            let timeout = self
                .scheduled_delay
                .saturating_sub(last_export_time.elapsed());
            match self.control.recv_timeout(timeout) {
                Ok(ControlMessage::ExportBatchReady) => {
                    self.export_message_pending.store(false, Ordering::Relaxed);
                    obs_debug!(name: "BatchSpanProcessor.ExportingDueToBatchSize");
                    log_export_failure(self.export_queued());
                    last_export_time = Instant::now();
                }
                Ok(ControlMessage::ForceFlush(reply)) => {
                    let result = self.export_queued().and_then(|_| self.exporter.force_flush());
                    let _ = reply.send(result);
                    last_export_time = Instant::now();
                }
                Ok(ControlMessage::Shutdown(reply)) => {
                    let result = self.export_queued();
                    let shutdown = self.exporter.shutdown();
                    let _ = reply.send(result.and(shutdown));
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {
                    log_export_failure(self.export_queued());
                    last_export_time = Instant::now();
                }
                Err(RecvTimeoutError::Disconnected) => {
                    // The processor was dropped without a shutdown.
                    log_export_failure(self.export_queued());
                    let _ = self.exporter.shutdown();
                    break;
                }
            }
        }
    }

    /// Exports everything currently queued, in chunks of at most
    /// `max_export_batch_size` spans. Returns the first failure.
    fn export_queued(&mut self) -> TelemetryResult {
        let mut first_error = Ok(());
        let mut batch = Vec::with_capacity(self.max_export_batch_size);
        loop {
            let exhausted = loop {
                if batch.len() >= self.max_export_batch_size {
                    break false;
                }
                match self.spans.try_recv() {
                    Ok(span) => batch.push(span),
                    Err(_) => break true,
                }
            };

            if !batch.is_empty() {
                self.current_batch_size
                    .fetch_sub(batch.len(), Ordering::Relaxed);
                let result = block_on(self.exporter.export(std::mem::take(&mut batch)));
                if first_error.is_ok() {
                    first_error = result;
                }
            }
            if exhausted {
                return first_error;
            }
        }
    }
}

fn log_export_failure(result: TelemetryResult) {
    if let Err(err) = result {
        obs_warn!(name: "BatchSpanProcessor.ExportFailed", error = err.to_string());
    }
}

/// Builder for [`BatchSpanProcessor`].
#[derive(Debug)]
pub struct BatchSpanProcessorBuilder<E> {
    exporter: E,
    config: BatchConfig,
}

impl<E> BatchSpanProcessorBuilder<E>
where
    E: SpanExporter + 'static,
{
    /// Set the [`BatchConfig`] for the processor.
    pub fn with_batch_config(self, config: BatchConfig) -> Self {
        BatchSpanProcessorBuilder { config, ..self }
    }

    /// Build a new instance of `BatchSpanProcessor`.
    pub fn build(self) -> BatchSpanProcessor {
        BatchSpanProcessor::new(self.exporter, self.config)
    }
}

/// Batch span processor configuration.
/// Use [`BatchConfigBuilder`] to configure your own instance of [`BatchConfig`].
#[derive(Clone, Debug, PartialEq)]
pub struct BatchConfig {
    /// The maximum number of spans buffered for export. Spans arriving while
    /// the queue is full are dropped. Defaults to 2048.
    pub(crate) max_queue_size: usize,

    /// The interval between two consecutive timer-driven exports.
    /// Defaults to 5 seconds.
    pub(crate) scheduled_delay: Duration,

    /// The maximum number of spans in a single export. Defaults to 512.
    pub(crate) max_export_batch_size: usize,

    /// How long `force_flush` waits for the worker. Defaults to 30 seconds.
    pub(crate) flush_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfigBuilder::default().build()
    }
}

/// A builder for creating [`BatchConfig`] instances.
#[derive(Debug)]
pub struct BatchConfigBuilder {
    max_queue_size: usize,
    scheduled_delay: Duration,
    max_export_batch_size: usize,
    flush_timeout: Duration,
}

impl Default for BatchConfigBuilder {
    /// Create a new [`BatchConfigBuilder`] initialized with the defaults,
    /// overridden by environment variables if set:
    /// * `OBS_BSP_MAX_QUEUE_SIZE`
    /// * `OBS_BSP_SCHEDULE_DELAY` (milliseconds)
    /// * `OBS_BSP_MAX_EXPORT_BATCH_SIZE`
    /// * `OBS_BSP_EXPORT_TIMEOUT` (milliseconds)
    fn default() -> Self {
        BatchConfigBuilder {
            max_queue_size: OBS_BSP_MAX_QUEUE_SIZE_DEFAULT,
            scheduled_delay: Duration::from_millis(OBS_BSP_SCHEDULE_DELAY_DEFAULT),
            max_export_batch_size: OBS_BSP_MAX_EXPORT_BATCH_SIZE_DEFAULT,
            flush_timeout: Duration::from_millis(OBS_BSP_EXPORT_TIMEOUT_DEFAULT),
        }
        .init_from_env_vars()
    }
}

impl BatchConfigBuilder {
    /// Set the maximum queue size.
    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    /// Set the maximum number of spans exported at once.
    pub fn with_max_export_batch_size(mut self, max_export_batch_size: usize) -> Self {
        self.max_export_batch_size = max_export_batch_size;
        self
    }

    /// Set the delay between timer-driven exports.
    pub fn with_scheduled_delay(mut self, scheduled_delay: Duration) -> Self {
        self.scheduled_delay = scheduled_delay;
        self
    }

    /// Set how long `force_flush` waits for the worker.
    pub fn with_flush_timeout(mut self, flush_timeout: Duration) -> Self {
        self.flush_timeout = flush_timeout;
        self
    }

    /// Builds a `BatchConfig`, clamping the batch size to the queue size.
    pub fn build(self) -> BatchConfig {
        let max_queue_size = self.max_queue_size.max(1);
        BatchConfig {
            max_queue_size,
            scheduled_delay: self.scheduled_delay,
            max_export_batch_size: self.max_export_batch_size.clamp(1, max_queue_size),
            flush_timeout: self.flush_timeout,
        }
    }

    fn init_from_env_vars(mut self) -> Self {
        if let Some(max_queue_size) = parse_env::<usize>(OBS_BSP_MAX_QUEUE_SIZE) {
            self.max_queue_size = max_queue_size;
        }
        if let Some(delay) = parse_env::<u64>(OBS_BSP_SCHEDULE_DELAY) {
            self.scheduled_delay = Duration::from_millis(delay);
        }
        if let Some(batch_size) = parse_env::<usize>(OBS_BSP_MAX_EXPORT_BATCH_SIZE) {
            self.max_export_batch_size = batch_size;
        }
        if let Some(timeout) = parse_env::<u64>(OBS_BSP_EXPORT_TIMEOUT) {
            self.flush_timeout = Duration::from_millis(timeout);
        }
        self
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|value| T::from_str(value.trim()).ok())
}
