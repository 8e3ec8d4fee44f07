//! A frontend and a product service running in one process.
//!
//! The frontend handles `GET /product?id=...` requests, starts a span for
//! each and calls the product service with the trace context injected into
//! the outbound headers. The product service continues the trace from those
//! headers under its own service name. Spans and logs of both are written to
//! stdout as JSON; internal diagnostics go through `tracing-subscriber`.
//!
//! ```text
//! OBS_LOG_LEVEL=debug RUST_LOG=app-obs=debug cargo run -p product-detail
//! ```
use app_obs::{ObservabilityConfig, Telemetry, TelemetryError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod frontend;
mod product;

fn init_telemetry(config: &ObservabilityConfig) -> Telemetry {
    Telemetry::builder()
        .with_config(config)
        .with_batch_exporter(app_obs_stdout::SpanExporter::default())
        .with_log_sink(app_obs_stdout::LogSink::default())
        .build()
}

#[tokio::main]
async fn main() -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("app-obs=warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ObservabilityConfig::from_env()?;
    let frontend_telemetry = init_telemetry(&config.clone().with_service_name("frontend"));
    let product_telemetry = init_telemetry(&config.with_service_name("product-service"));

    let startup = frontend_telemetry.background();
    startup.log().info("frontend ready");

    let product = product::ProductApi::new(product_telemetry.clone());
    let frontend = frontend::Frontend::new(frontend_telemetry.clone(), product);

    let requests = ["/product?id=42", "/product?id=missing-7", "/product"];
    let mut handles = Vec::with_capacity(requests.len());
    for uri in requests {
        let frontend = frontend.clone();
        handles.push(tokio::spawn(async move {
            let request = http::Request::get(uri).body(())?;
            Ok::<_, http::Error>(frontend.handle(request).await)
        }));
    }

    for handle in handles {
        match handle.await {
            Ok(Ok(response)) => startup
                .log()
                .with_field("status", i64::from(response.status().as_u16()))
                .info(response.into_body()),
            Ok(Err(err)) => startup.log().with_field("error", err.to_string()).error("request not sent"),
            Err(err) => startup.log().with_field("error", err.to_string()).error("request task failed"),
        }
    }

    startup.log().info("shutting down");
    product_telemetry.shutdown()?;
    frontend_telemetry.shutdown()
}

/// The value of query parameter `name`, if present and not empty.
pub(crate) fn query_param(uri: &http::Uri, name: &str) -> Option<String> {
    uri.query()?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_owned())
}

pub(crate) fn respond(status: http::StatusCode, body: impl Into<String>) -> http::Response<String> {
    let mut response = http::Response::new(body.into());
    *response.status_mut() = status;
    response
}
