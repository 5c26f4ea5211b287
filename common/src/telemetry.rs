// Structured logging, Prometheus metrics and optional OTLP tracing

use anyhow::Result;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    trace::{RandomIdGenerator, Sampler, TracerProvider},
    Resource,
};
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Install the JSON log subscriber, plus an OpenTelemetry layer when an OTLP
/// endpoint is configured. `RUST_LOG` overrides `log_level`.
#[tracing::instrument(skip_all)]
pub fn init_logging(service_name: &'static str, log_level: &str, tracing_endpoint: Option<&str>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(env_filter);

    let registry = tracing_subscriber::registry().with(json_layer);

    if let Some(endpoint) = tracing_endpoint.filter(|e| !e.is_empty()) {
        let tracer = init_tracer(service_name, endpoint)?;
        let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);
        registry
            .with(telemetry_layer)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    } else {
        registry
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    }

    tracing::info!(service = service_name, log_level, tracing_endpoint, "Logging initialized");
    Ok(())
}

#[tracing::instrument(skip_all)]
fn init_tracer(service_name: &'static str, endpoint: &str) -> Result<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry_sdk::runtime::Tokio;

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint)
        .build_span_exporter()
        .map_err(|e| anyhow::anyhow!("Failed to build span exporter: {}", e))?;

    let tracer_provider = TracerProvider::builder()
        .with_batch_exporter(exporter, Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", service_name),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])),
        )
        .build();

    global::set_tracer_provider(tracer_provider.clone());
    let tracer = tracer_provider.tracer(service_name);

    tracing::info!(endpoint, "OTLP tracer initialized");
    Ok(tracer)
}

/// Flush remaining spans on shutdown
pub fn shutdown_tracer() {
    global::shutdown_tracer_provider();
}

fn describe_metrics() {
    describe_counter!("crm_logins_total", "Successful logins by provider");
    describe_counter!("crm_webhook_events_total", "Payment webhook deliveries by event and result");
    describe_counter!("crm_lead_submissions_total", "Public lead form submissions by status");
    describe_counter!("crm_reminders_dispatched_total", "Task reminders recorded by the worker");
    describe_counter!("crm_migrations_applied_total", "Migration steps applied");
    describe_histogram!("crm_http_request_duration_seconds", "HTTP request latency");
}

/// Install the global recorder and return the handle the api renders at `/metrics`
#[tracing::instrument(skip_all)]
pub fn install_metrics_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;
    describe_metrics();
    Ok(handle)
}

/// Serve metrics on a dedicated port (used by the worker, which has no router)
#[tracing::instrument(skip_all)]
pub fn init_metrics_listener(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;
    describe_metrics();

    tracing::info!(metrics_port, "Prometheus exporter listening");
    Ok(())
}

#[inline]
pub fn record_login(provider: &'static str) {
    counter!("crm_logins_total", "provider" => provider).increment(1);
}

#[inline]
pub fn record_webhook_event(event: &str, result: &'static str) {
    counter!("crm_webhook_events_total", "event" => event.to_string(), "result" => result).increment(1);
}

#[inline]
pub fn record_lead_submission(status: &'static str) {
    counter!("crm_lead_submissions_total", "status" => status).increment(1);
}

#[inline]
pub fn record_reminder_dispatched() {
    counter!("crm_reminders_dispatched_total").increment(1);
}

#[inline]
pub fn record_migration_applied(step: &str) {
    counter!("crm_migrations_applied_total", "step" => step.to_string()).increment(1);
}

#[inline]
pub fn record_request_duration(method: &str, status: u16, seconds: f64) {
    histogram!(
        "crm_http_request_duration_seconds",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .record(seconds);
}
