use std::time::Duration;

use anyhow::Result;
use opentelemetry::{global, trace::TracerProvider, KeyValue};
use opentelemetry_otlp::{MetricExporter, SpanExporter, WithExportConfig};
use opentelemetry_sdk::{
    metrics::{PeriodicReader, SdkMeterProvider},
    trace::{SdkTracerProvider, TracerProviderBuilder},
    Resource,
};
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, Layer};

use crate::config::ServerConfig;

const SERVICE_NAME: &str = "filestore-server";
const METRICS_EXPORT_INTERVAL: Duration = Duration::from_secs(10);

pub fn get_env_filter() -> tracing_subscriber::EnvFilter {
    // RUST_LOG used to control logging level.
    tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::default()
            .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
    })
}

pub fn get_log_layer<S>(config: &ServerConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    S: tracing::Subscriber,
{
    if config.structured_logging {
        return Box::new(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .flatten_event(true),
        );
    }

    Box::new(tracing_subscriber::fmt::layer().compact())
}

fn resource() -> Resource {
    Resource::builder()
        .with_service_name(SERVICE_NAME)
        .with_attribute(KeyValue::new(
            "service.version",
            env!("CARGO_PKG_VERSION"),
        ))
        .build()
}

/// Providers that must be flushed before the process exits.
#[derive(Default)]
pub struct TelemetryProviders {
    tracer_provider: Option<SdkTracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
}

impl TelemetryProviders {
    pub fn shutdown(self) {
        if let Some(tracer_provider) = self.tracer_provider {
            if let Err(err) = tracer_provider.force_flush() {
                error!("error flushing traces: {:?}", err);
            }
            if let Err(err) = tracer_provider.shutdown() {
                error!("error shutting down tracer provider: {:?}", err);
            }
        }
        if let Some(meter_provider) = self.meter_provider {
            if let Err(err) = meter_provider.shutdown() {
                error!("error shutting down meter provider: {:?}", err);
            }
        }
    }
}

fn init_meter_provider(config: &ServerConfig) -> Result<Option<SdkMeterProvider>> {
    if !config.telemetry.enable_metrics {
        return Ok(None);
    }
    let mut exporter = MetricExporter::builder().with_tonic();
    if let Some(endpoint) = &config.telemetry.endpoint {
        exporter = exporter.with_endpoint(endpoint.to_owned());
    }
    let exporter = exporter.build()?;
    let reader = PeriodicReader::builder(exporter)
        .with_interval(METRICS_EXPORT_INTERVAL)
        .build();
    let provider = SdkMeterProvider::builder()
        .with_resource(resource())
        .with_reader(reader)
        .build();
    global::set_meter_provider(provider.clone());
    Ok(Some(provider))
}

pub fn setup_tracing(config: &ServerConfig) -> Result<TelemetryProviders> {
    let meter_provider = init_meter_provider(config)?;
    let base = tracing_subscriber::Registry::default();

    if !config.telemetry.enable_tracing {
        let subscriber = base.with(get_log_layer(config).with_filter(get_env_filter()));
        if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
            error!("logger was already initiated, continuing: {:?}", e);
        }
        return Ok(TelemetryProviders {
            tracer_provider: None,
            meter_provider,
        });
    }

    let mut span_exporter = SpanExporter::builder().with_tonic();
    if let Some(endpoint) = &config.telemetry.endpoint {
        span_exporter = span_exporter.with_endpoint(endpoint.clone());
    }
    let span_exporter = span_exporter.build()?;
    let tracer_provider = TracerProviderBuilder::default()
        .with_resource(resource())
        .with_simple_exporter(span_exporter)
        .build();
    global::set_tracer_provider(tracer_provider.clone());

    let span_layer = tracing_opentelemetry::layer()
        .with_tracer(tracer_provider.tracer(SERVICE_NAME))
        .with_filter(get_env_filter());
    let log_layer = get_log_layer(config).with_filter(get_env_filter());
    let subscriber = base.with(span_layer).with(log_layer);
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        error!("logger was already initiated, continuing: {:?}", e);
    }

    Ok(TelemetryProviders {
        tracer_provider: Some(tracer_provider),
        meter_provider,
    })
}
