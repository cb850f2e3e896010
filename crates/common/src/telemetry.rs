use crate::config::{ConfigError, Environment, parse_var};
use crate::logging::{env_filter, fmt_layer};
use opentelemetry::{KeyValue, global};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    metrics::{PeriodicReader, SdkMeterProvider},
    propagation::TraceContextPropagator,
    trace::{Sampler, SdkTracerProvider},
};
use opentelemetry_semantic_conventions::attribute::{SERVICE_NAME, SERVICE_VERSION};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_METRIC_INTERVAL_MS: u64 = 10_000;

/// Owns the OTLP tracer and meter providers of one binary.
///
/// Keep it alive in `main`; dropping it flushes and shuts both providers down.
///
/// ```ignore
/// let _telemetry = TelemetryGuard::init("gateway", "http://localhost:4317", Environment::Production)?;
/// ```
pub struct TelemetryGuard {
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
}

impl TelemetryGuard {
    /// Install OTLP/gRPC exporters plus the logging layers of [`crate::setup_logging`].
    ///
    /// Must be called from within a Tokio runtime.
    pub fn init(
        service_name: &str,
        endpoint: &str,
        environment: Environment,
    ) -> anyhow::Result<Self> {
        let interval = metric_interval(|key| std::env::var(key).ok())?;
        let resource = resource(service_name, environment);

        global::set_text_map_propagator(TraceContextPropagator::new());

        let tracer_provider = tracer_provider(endpoint, resource.clone())?;
        global::set_tracer_provider(tracer_provider.clone());

        let meter_provider = meter_provider(endpoint, resource, interval)?;
        global::set_meter_provider(meter_provider.clone());

        tracing_subscriber::registry()
            .with(env_filter())
            .with(tracing_opentelemetry::layer().with_tracer(global::tracer(service_name.to_string())))
            .with(fmt_layer(environment))
            .init();

        tracing::info!(
            service_name,
            endpoint,
            metric_interval_ms = interval.as_millis() as u64,
            "OpenTelemetry export enabled"
        );

        Ok(Self {
            tracer_provider,
            meter_provider,
        })
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        // The subscriber may already be torn down; report straight to stderr.
        if let Err(e) = self.tracer_provider.shutdown() {
            eprintln!("tracer provider shutdown failed: {e:?}");
        }
        if let Err(e) = self.meter_provider.shutdown() {
            eprintln!("meter provider shutdown failed: {e:?}");
        }
    }
}

fn resource(service_name: &str, environment: Environment) -> Resource {
    Resource::builder()
        .with_attributes([
            KeyValue::new(SERVICE_NAME, service_name.to_string()),
            KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
            KeyValue::new("deployment.environment", environment.as_str()),
        ])
        .build()
}

fn tracer_provider(endpoint: &str, resource: Resource) -> anyhow::Result<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_resource(resource)
        .with_sampler(Sampler::ParentBased(Box::new(Sampler::AlwaysOn)))
        .with_batch_exporter(exporter)
        .build())
}

fn meter_provider(
    endpoint: &str,
    resource: Resource,
    interval: Duration,
) -> anyhow::Result<SdkMeterProvider> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(interval)
        .build();

    Ok(SdkMeterProvider::builder()
        .with_resource(resource)
        .with_reader(reader)
        .build())
}

/// Export period from `OTEL_METRIC_EXPORT_INTERVAL` (milliseconds).
fn metric_interval<L>(lookup: L) -> Result<Duration, ConfigError>
where
    L: Fn(&str) -> Option<String>,
{
    let ms = parse_var(&lookup, "OTEL_METRIC_EXPORT_INTERVAL", DEFAULT_METRIC_INTERVAL_MS)?;
    if ms == 0 {
        return Err(ConfigError::InvalidValue {
            key: "OTEL_METRIC_EXPORT_INTERVAL",
            value: ms.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_interval() {
        assert_eq!(metric_interval(|_| None).unwrap(), Duration::from_secs(10));
        assert_eq!(
            metric_interval(|_| Some("2500".to_string())).unwrap(),
            Duration::from_millis(2500)
        );
        assert!(metric_interval(|_| Some("0".to_string())).is_err());
        assert!(metric_interval(|_| Some("often".to_string())).is_err());
    }
}
