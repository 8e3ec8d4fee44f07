//! Process-wide observability settings.
//!
//! [`ObservabilityConfig::from_env`] reads the `OBS_*` environment variables
//! below; every value can also be set with the builder-style methods, which
//! take precedence when applied after `from_env`.
//!
//! | variable                 | meaning                                    | default           |
//! |--------------------------|--------------------------------------------|-------------------|
//! | `OBS_SERVICE_NAME`       | `service.name` resource attribute          | `unknown_service` |
//! | `OBS_APPLICATION`        | `application` resource attribute           | unset             |
//! | `OBS_ENVIRONMENT`        | `environment` resource attribute           | unset             |
//! | `OBS_APM_TYPE`           | `otlp`, `datadog` or `none`                | `otlp`            |
//! | `OBS_LOG_LEVEL`          | `debug`, `info`, `warn` or `error`         | `info`            |
//! | `OBS_ERROR_PROPAGATION`  | `span` or `ancestors`                      | `span`            |
//! | `OBS_SHUTDOWN_TIMEOUT`   | shutdown deadline in milliseconds          | `5000`            |
//!
//! Batch export settings live in [`BatchConfig`](crate::trace::BatchConfig).
use crate::error::TelemetryError;
use crate::logs::{ErrorPropagation, Level};
use crate::resource::Resource;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub(crate) const OBS_SERVICE_NAME: &str = "OBS_SERVICE_NAME";
pub(crate) const OBS_APPLICATION: &str = "OBS_APPLICATION";
pub(crate) const OBS_ENVIRONMENT: &str = "OBS_ENVIRONMENT";
pub(crate) const OBS_APM_TYPE: &str = "OBS_APM_TYPE";
pub(crate) const OBS_LOG_LEVEL: &str = "OBS_LOG_LEVEL";
pub(crate) const OBS_ERROR_PROPAGATION: &str = "OBS_ERROR_PROPAGATION";
pub(crate) const OBS_SHUTDOWN_TIMEOUT: &str = "OBS_SHUTDOWN_TIMEOUT";
pub(crate) const OBS_SHUTDOWN_TIMEOUT_DEFAULT: u64 = 5_000;

/// The tracing backend spans are recorded for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ApmType {
    /// Spans record events, and errors as `exception` events.
    #[default]
    Otlp,
    /// Spans record events, errors and status as tags; ids propagate in
    /// Datadog headers.
    Datadog,
    /// Spans are not recorded; trace context still propagates.
    None,
}

impl ApmType {
    /// Lower-case name, as accepted by `OBS_APM_TYPE`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ApmType::Otlp => "otlp",
            ApmType::Datadog => "datadog",
            ApmType::None => "none",
        }
    }
}

impl fmt::Display for ApmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApmType {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "otlp" | "otel" | "opentelemetry" => Ok(ApmType::Otlp),
            "datadog" | "dd" => Ok(ApmType::Datadog),
            "none" | "" => Ok(ApmType::None),
            other => Err(TelemetryError::InvalidConfig(format!(
                "unknown APM type {other:?}"
            ))),
        }
    }
}

/// Settings shared by every handle of the process.
#[derive(Clone, Debug, PartialEq)]
pub struct ObservabilityConfig {
    /// `service.name` resource attribute
    pub service_name: Option<String>,
    /// `application` resource attribute
    pub application: Option<String>,
    /// `environment` resource attribute
    pub environment: Option<String>,
    /// Backend selection
    pub apm_type: ApmType,
    /// Minimum level of application logs
    pub log_level: Level,
    /// How far logged errors mark spans as failed
    pub error_propagation: ErrorPropagation,
    /// Deadline for [`Telemetry::shutdown`](crate::Telemetry::shutdown)
    pub shutdown_timeout: Duration,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        ObservabilityConfig {
            service_name: None,
            application: None,
            environment: None,
            apm_type: ApmType::default(),
            log_level: Level::default(),
            error_propagation: ErrorPropagation::default(),
            shutdown_timeout: Duration::from_millis(OBS_SHUTDOWN_TIMEOUT_DEFAULT),
        }
    }
}

impl ObservabilityConfig {
    /// Reads the configuration from `OBS_*` environment variables.
    ///
    /// Unset or empty variables keep their defaults. A value that is set but
    /// cannot be parsed is an [`InvalidConfig`](TelemetryError::InvalidConfig)
    /// error rather than a silent fallback.
    pub fn from_env() -> Result<Self, TelemetryError> {
        let mut config = ObservabilityConfig::default();
        config.service_name = non_empty_var(OBS_SERVICE_NAME);
        config.application = non_empty_var(OBS_APPLICATION);
        config.environment = non_empty_var(OBS_ENVIRONMENT);
        if let Some(apm_type) = non_empty_var(OBS_APM_TYPE) {
            config.apm_type = apm_type.parse()?;
        }
        if let Some(level) = non_empty_var(OBS_LOG_LEVEL) {
            config.log_level = level.parse()?;
        }
        if let Some(policy) = non_empty_var(OBS_ERROR_PROPAGATION) {
            config.error_propagation = policy.parse()?;
        }
        if let Some(timeout) = non_empty_var(OBS_SHUTDOWN_TIMEOUT) {
            let millis = timeout.parse::<u64>().map_err(|err| {
                TelemetryError::InvalidConfig(format!("{OBS_SHUTDOWN_TIMEOUT}={timeout:?}: {err}"))
            })?;
            config.shutdown_timeout = Duration::from_millis(millis);
        }
        Ok(config)
    }

    /// Sets the service name.
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Sets the application label.
    pub fn with_application(mut self, application: impl Into<String>) -> Self {
        self.application = Some(application.into());
        self
    }

    /// Sets the environment label.
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Selects the backend.
    pub fn with_apm_type(mut self, apm_type: ApmType) -> Self {
        self.apm_type = apm_type;
        self
    }

    /// Sets the minimum log level.
    pub fn with_log_level(mut self, level: Level) -> Self {
        self.log_level = level;
        self
    }

    /// Sets the error propagation policy.
    pub fn with_error_propagation(mut self, policy: ErrorPropagation) -> Self {
        self.error_propagation = policy;
        self
    }

    /// Sets the shutdown deadline.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// The resource every span of this process is exported with.
    pub fn resource(&self) -> Resource {
        let mut builder = Resource::builder();
        if let Some(name) = &self.service_name {
            builder = builder.with_service_name(name.clone());
        }
        if let Some(application) = &self.application {
            builder = builder.with_application(application.clone());
        }
        if let Some(environment) = &self.environment {
            builder = builder.with_environment(environment.clone());
        }
        builder.build()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}
