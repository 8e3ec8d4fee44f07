//! Errors returned by the control-plane operations of the telemetry pipeline.
//!
//! Logging and span calls never return these: failures on the data path are
//! reported through the internal diagnostics instead.
use std::sync::PoisonError;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by flush, shutdown and configuration operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TelemetryError {
    /// Shutdown has already been invoked.
    ///
    /// While shutdown is idempotent and calling it multiple times has no
    /// impact, this error is returned to report the redundant call.
    #[error("Shutdown already invoked")]
    AlreadyShutdown,

    /// The operation did not complete within the given duration.
    #[error("Operation timed out after {} milliseconds", .0.as_millis())]
    Timeout(Duration),

    /// The operation failed for a reason internal to the pipeline, such as an
    /// exporter rejecting a batch or a sink failing to write.
    #[error("Operation failed: {0}")]
    InternalFailure(String),

    /// A configuration value could not be parsed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl<T> From<PoisonError<T>> for TelemetryError {
    fn from(err: PoisonError<T>) -> Self {
        TelemetryError::InternalFailure(format!("Mutex poisoned: {err}"))
    }
}

/// A specialized `Result` type for control-plane operations.
pub type TelemetryResult = Result<(), TelemetryError>;

/// Result of exporting a batch of spans.
pub type ExportResult = Result<(), TelemetryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn timeout_display_uses_milliseconds() {
        let err = TelemetryError::Timeout(Duration::from_secs(2));
        assert_eq!(err.to_string(), "Operation timed out after 2000 milliseconds");
    }

    #[test]
    fn poisoned_mutex_converts_to_internal_failure() {
        let lock = std::sync::Arc::new(Mutex::new(0));
        let poisoner = lock.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        let err: TelemetryError = lock.lock().unwrap_err().into();
        assert!(matches!(err, TelemetryError::InternalFailure(msg) if msg.contains("poisoned")));
    }
}
