//! Logging and optional OpenTelemetry export for the load generator.
//!
//! Console logs are always on and filtered through `RUST_LOG` (default
//! `info`). The cargo features below add export on top:
//!
//! - `tracing`: spans of the run are exported through an OpenTelemetry tracer.
//! - `metrics`: exports `requests`, `request_errors`, `requests_cancelled`,
//!   `handler_calls`, `batch_size` and `request_latency`.
//! - `stdout`: both exporters print to stdout every five seconds.
//!
//! Without `metrics`, the `increment_*`/`record_*` helpers are no-ops, so call
//! sites never need their own feature gates.
//!
//! ```bash
//! cargo run -p bulker-loadgen --features tracing,metrics,stdout
//! ```

#[cfg(all(feature = "stdout", not(any(feature = "tracing", feature = "metrics"))))]
compile_error!(
    "The 'stdout' feature requires at least one of 'tracing' or 'metrics' to be enabled."
);

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics::SdkMeterProvider;
#[cfg(feature = "tracing")]
use opentelemetry_sdk::trace::SdkTracerProvider;
#[cfg(any(feature = "metrics", feature = "tracing"))]
use {
    opentelemetry::{InstrumentationScope, KeyValue},
    opentelemetry_sdk::Resource,
    opentelemetry_semantic_conventions as semconv,
};

const SERVICE_NAME: &str = "bulker-loadgen";

#[cfg(feature = "stdout")]
const EXPORT_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);

/// Exporter pipelines that must be flushed before the process exits.
pub struct TelemetryProviders {
    #[cfg(feature = "tracing")]
    tracer_provider: SdkTracerProvider,
    #[cfg(feature = "metrics")]
    meter_provider: SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes and stops every exporter. Failures are printed to stderr.
    pub fn shutdown(self) {
        #[cfg(feature = "tracing")]
        if let Err(err) = self
            .tracer_provider
            .force_flush()
            .and_then(|()| self.tracer_provider.shutdown())
        {
            eprintln!("Error stopping tracer provider: {err:#?}");
        }

        #[cfg(feature = "metrics")]
        if let Err(err) = self
            .meter_provider
            .force_flush()
            .and_then(|()| self.meter_provider.shutdown())
        {
            eprintln!("Error stopping meter provider: {err:#?}");
        }
    }
}

/// Installs the global subscriber and, depending on features, the
/// OpenTelemetry providers behind it.
///
/// # Errors
///
/// Fails if a global subscriber was already installed.
pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    let console = tracing_subscriber::fmt::layer()
        .with_thread_ids(true)
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry().with(filter).with(console);

    #[cfg(any(feature = "metrics", feature = "tracing"))]
    let (resource, scope) = otel_identity();

    #[cfg(feature = "tracing")]
    let (subscriber, tracer_provider) = {
        use opentelemetry::trace::TracerProvider as _;

        let provider = tracer_provider(resource.clone());
        opentelemetry::global::set_tracer_provider(provider.clone());
        let layer = tracing_opentelemetry::layer()
            .with_tracer(provider.tracer_with_scope(scope.clone()))
            .with_error_records_to_exceptions(true);
        (subscriber.with(layer), provider)
    };

    #[cfg(feature = "metrics")]
    let (subscriber, meter_provider) = {
        let provider = meter_provider(resource);
        opentelemetry::global::set_meter_provider(provider.clone());
        Metrics::install(&opentelemetry::global::meter_with_scope(scope));
        let layer = tracing_opentelemetry::MetricsLayer::new(provider.clone());
        (subscriber.with(layer), provider)
    };

    subscriber.try_init()?;

    Ok(TelemetryProviders {
        #[cfg(feature = "tracing")]
        tracer_provider,
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

/// The resource and instrumentation scope every exported signal carries.
#[cfg(any(feature = "metrics", feature = "tracing"))]
fn otel_identity() -> (Resource, InstrumentationScope) {
    let version = env!("CARGO_PKG_VERSION");
    let resource = Resource::builder()
        .with_service_name(SERVICE_NAME)
        .with_attribute(KeyValue::new(semconv::resource::SERVICE_VERSION, version))
        .build();
    let scope = InstrumentationScope::builder(SERVICE_NAME)
        .with_version(version)
        .with_schema_url(semconv::SCHEMA_URL)
        .build();
    (resource, scope)
}

#[cfg(feature = "tracing")]
fn tracer_provider(resource: Resource) -> SdkTracerProvider {
    let builder = SdkTracerProvider::builder().with_resource(resource);

    #[cfg(feature = "stdout")]
    let builder = {
        use opentelemetry_sdk::trace::{BatchConfigBuilder, BatchSpanProcessor};

        let config = BatchConfigBuilder::default()
            .with_scheduled_delay(EXPORT_INTERVAL)
            .build();
        builder.with_span_processor(
            BatchSpanProcessor::builder(opentelemetry_stdout::SpanExporter::default())
                .with_batch_config(config)
                .build(),
        )
    };

    builder.build()
}

#[cfg(feature = "metrics")]
fn meter_provider(resource: Resource) -> SdkMeterProvider {
    let builder = SdkMeterProvider::builder().with_resource(resource);

    #[cfg(feature = "stdout")]
    let builder = builder.with_reader(
        opentelemetry_sdk::metrics::PeriodicReader::builder(
            opentelemetry_stdout::MetricExporter::default(),
        )
        .with_interval(EXPORT_INTERVAL)
        .build(),
    );

    builder.build()
}

/// Instruments of one load run.
#[cfg(feature = "metrics")]
struct Metrics {
    /// Submissions sent to the accumulator.
    requests: Counter<u64>,
    /// Submissions that resolved with an error.
    request_errors: Counter<u64>,
    /// Submissions abandoned by timeout or shutdown.
    requests_cancelled: Counter<u64>,
    /// Bulk calls served by the store.
    handler_calls: Counter<u64>,
    /// Items per bulk call.
    batch_size: Histogram<f64>,
    /// Submit-to-result latency, in milliseconds.
    request_latency: Histogram<f64>,
}

#[cfg(feature = "metrics")]
static METRICS: std::sync::OnceLock<Metrics> = std::sync::OnceLock::new();

#[cfg(feature = "metrics")]
impl Metrics {
    fn install(meter: &Meter) {
        let _ = METRICS.set(Self {
            requests: meter.u64_counter("requests").build(),
            request_errors: meter.u64_counter("request_errors").build(),
            requests_cancelled: meter.u64_counter("requests_cancelled").build(),
            handler_calls: meter.u64_counter("handler_calls").build(),
            batch_size: meter.f64_histogram("batch_size").build(),
            request_latency: meter
                .f64_histogram("request_latency")
                .with_unit("ms")
                .build(),
        });
    }

    fn with(f: impl FnOnce(&Self)) {
        if let Some(metrics) = METRICS.get() {
            f(metrics);
        }
    }
}

#[cfg(feature = "metrics")]
pub fn increment_requests() {
    Metrics::with(|m| m.requests.add(1, &[]));
}

#[cfg(feature = "metrics")]
pub fn increment_request_errors() {
    Metrics::with(|m| m.request_errors.add(1, &[]));
}

#[cfg(feature = "metrics")]
pub fn increment_requests_cancelled() {
    Metrics::with(|m| m.requests_cancelled.add(1, &[]));
}

#[cfg(feature = "metrics")]
pub fn increment_handler_calls() {
    Metrics::with(|m| m.handler_calls.add(1, &[]));
}

#[cfg(feature = "metrics")]
pub fn record_batch_size(items: f64) {
    Metrics::with(|m| m.batch_size.record(items, &[]));
}

#[cfg(feature = "metrics")]
pub fn record_request_latency(latency_ms: f64) {
    Metrics::with(|m| m.request_latency.record(latency_ms, &[]));
}

#[cfg(not(feature = "metrics"))]
pub fn increment_requests() {}

#[cfg(not(feature = "metrics"))]
pub fn increment_request_errors() {}

#[cfg(not(feature = "metrics"))]
pub fn increment_requests_cancelled() {}

#[cfg(not(feature = "metrics"))]
pub fn increment_handler_calls() {}

#[cfg(not(feature = "metrics"))]
pub fn record_batch_size(_items: f64) {}

#[cfg(not(feature = "metrics"))]
pub fn record_request_latency(_latency_ms: f64) {}
