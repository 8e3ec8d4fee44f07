#![allow(unused_macros)]
//! Diagnostics emitted by this crate about itself.
//!
//! **Note**: These macros (`obs_debug!`, `obs_warn!` and `obs_error!`) report
//! problems *inside* the telemetry pipeline: misuse of a span guard, a full
//! export queue, a failing sink. They are not meant for application logging,
//! which goes through [`CorrelatedLogger`](crate::logs::CorrelatedLogger).
//!
//! Events are forwarded to the `tracing` crate with the crate name as target,
//! so a `tracing-subscriber` filter such as `app-obs=warn` controls them.

/// Macro for logging debug messages about the telemetry pipeline.
///
/// # Example:
/// ```rust
/// use app_obs::obs_debug;
/// obs_debug!(name: "BatchSpanProcessor.ExportingDueToTimer", batch_size = 3);
/// ```
#[macro_export]
macro_rules! obs_debug {
    (name: $name:expr $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::debug!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name);
        }
        #[cfg(not(feature = "internal-logs"))]
        {
            let _ = $name;
        }
    };
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::debug!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name, $($key = $value),+);
        }
        #[cfg(not(feature = "internal-logs"))]
        {
            let _ = ($name, $($value),+);
        }
    };
}

/// Macro for logging warnings about the telemetry pipeline.
///
/// # Example:
/// ```rust
/// use app_obs::obs_warn;
/// obs_warn!(name: "Span.AlreadyEnded", span_id = "00f067aa0ba902b7");
/// ```
#[macro_export]
macro_rules! obs_warn {
    (name: $name:expr $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::warn!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name);
        }
        #[cfg(not(feature = "internal-logs"))]
        {
            let _ = $name;
        }
    };
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::warn!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name, $($key = $value),+);
        }
        #[cfg(not(feature = "internal-logs"))]
        {
            let _ = ($name, $($value),+);
        }
    };
}

/// Macro for logging errors raised inside the telemetry pipeline.
///
/// # Example:
/// ```rust
/// use app_obs::obs_error;
/// obs_error!(name: "LogSink.WriteFailed", error = "broken pipe");
/// ```
#[macro_export]
macro_rules! obs_error {
    (name: $name:expr $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::error!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name);
        }
        #[cfg(not(feature = "internal-logs"))]
        {
            let _ = $name;
        }
    };
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::error!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name, $($key = $value),+);
        }
        #[cfg(not(feature = "internal-logs"))]
        {
            let _ = ($name, $($value),+);
        }
    };
}
