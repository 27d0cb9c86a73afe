//! Logging and OpenTelemetry export for the blog server.
//!
//! Console logging through `tracing_subscriber::fmt` is always on and
//! filtered by `RUST_LOG` (default `info`). Everything else is opt-in at
//! compile time.
//!
//! ## Features
//!
//! - `traces`: export `tracing` spans through OpenTelemetry. Every RPC
//!   handler runs in a span named after the method, and the `ListBlogs`
//!   feeder in a child `streaming` span. Events inside a span become span
//!   events; events outside one only reach the console.
//! - `metrics`: export the service instruments (see below).
//! - `stdout`: print exported spans and metrics to stdout.
//! - `otlp`: ship them to an OTLP/gRPC collector.
//!
//! Exporters need at least one of `traces` or `metrics`; `stdout` and `otlp`
//! can be combined.
//!
//! ## OTLP settings
//!
//! | Variable           | Meaning                                          |
//! |--------------------|--------------------------------------------------|
//! | `OTLP_ENDPOINT`    | Collector URL (required); `https://` enables TLS |
//! | `OTLP_HEADERS`     | `key=value,...` sent as gRPC metadata            |
//! | `OTLP_COMPRESSION` | `gzip` (default) or `zstd`                       |
//!
//! Sending to Honeycomb, for example:
//!
//! ```bash
//! OTLP_ENDPOINT=https://api.honeycomb.io:443 \
//! OTLP_HEADERS=x-honeycomb-team=$KEY,x-honeycomb-dataset=blog \
//! cargo run --features traces,metrics,otlp
//! ```
//!
//! ## Instruments
//!
//! - `requests`, `errors`: counters per RPC (`rpc` attribute).
//! - `blogs_streamed`: posts delivered over `ListBlogs`.
//! - `streams_inflight`: open `ListBlogs` streams.
//! - `stream_duration`: `ListBlogs` lifetime in milliseconds.

#[cfg(all(
    any(feature = "stdout", feature = "otlp"),
    not(any(feature = "traces", feature = "metrics"))
))]
compile_error!("The 'stdout' and 'otlp' exporters require 'traces' or 'metrics' to be enabled.");

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(any(feature = "metrics", feature = "traces"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "metrics", feature = "traces"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "metrics", feature = "traces"))]
use opentelemetry_semantic_conventions as semvcns;
#[cfg(any(feature = "stdout", feature = "otlp"))]
use std::time::Duration;

#[cfg(feature = "traces")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "traces")]
use opentelemetry_sdk::propagation::TraceContextPropagator;
#[cfg(feature = "traces")]
use opentelemetry_sdk::trace as sdktrace;

#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

#[cfg(feature = "otlp")]
use anyhow::Context;
#[cfg(feature = "otlp")]
use opentelemetry_otlp::{Compression, Protocol, WithExportConfig, WithTonicConfig};
#[cfg(feature = "otlp")]
use tonic::metadata::{Ascii, MetadataKey, MetadataMap, MetadataValue};
#[cfg(feature = "otlp")]
use tonic::transport::ClientTlsConfig;

/// How often stdout and OTLP exporters flush.
#[cfg(any(feature = "stdout", feature = "otlp"))]
const EXPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Exporter pipelines that must be flushed before the process exits.
pub struct TelemetryProviders {
    #[cfg(feature = "traces")]
    pub tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

/// Installs the global subscriber and, when enabled, the OpenTelemetry
/// providers.
pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .pretty(),
        );

    #[cfg(feature = "traces")]
    let tracer_provider = tracer_provider()?;
    #[cfg(feature = "traces")]
    let registry = {
        opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());
        opentelemetry::global::set_tracer_provider(tracer_provider.clone());
        registry.with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer_with_scope(scope()))
                .with_error_records_to_exceptions(true),
        )
    };

    #[cfg(feature = "metrics")]
    let meter_provider = meter_provider()?;
    #[cfg(feature = "metrics")]
    let registry = {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        register_instruments(&opentelemetry::global::meter_with_scope(scope()));
        registry.with(tracing_opentelemetry::MetricsLayer::new(
            meter_provider.clone(),
        ))
    };

    registry.init();

    Ok(TelemetryProviders {
        #[cfg(feature = "traces")]
        tracer_provider,
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

#[cfg(any(feature = "metrics", feature = "traces"))]
fn scope() -> InstrumentationScope {
    InstrumentationScope::builder("blog-tonic-server")
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build()
}

#[cfg(any(feature = "metrics", feature = "traces"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name("blog-tonic")
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "traces")]
fn tracer_provider() -> anyhow::Result<sdktrace::SdkTracerProvider> {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = builder.with_span_processor(batched(opentelemetry_stdout::SpanExporter::default()));

    #[cfg(feature = "otlp")]
    let builder = {
        let exporter = OtlpTarget::from_env()?
            .apply(opentelemetry_otlp::SpanExporter::builder().with_tonic())
            .build()
            .context("failed to build OTLP span exporter")?;
        builder.with_span_processor(batched(exporter))
    };

    Ok(builder.build())
}

#[cfg(all(feature = "traces", any(feature = "stdout", feature = "otlp")))]
fn batched<E>(exporter: E) -> sdktrace::BatchSpanProcessor
where
    E: sdktrace::SpanExporter + 'static,
{
    sdktrace::BatchSpanProcessor::builder(exporter)
        .with_batch_config(
            sdktrace::BatchConfigBuilder::default()
                .with_scheduled_delay(EXPORT_INTERVAL)
                .with_max_queue_size(2048)
                .build(),
        )
        .build()
}

#[cfg(feature = "metrics")]
fn meter_provider() -> anyhow::Result<sdkmetrics::SdkMeterProvider> {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = builder.with_reader(
        sdkmetrics::PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default())
            .with_interval(EXPORT_INTERVAL)
            .build(),
    );

    #[cfg(feature = "otlp")]
    let builder = {
        let exporter = OtlpTarget::from_env()?
            .apply(opentelemetry_otlp::MetricExporter::builder().with_tonic())
            .build()
            .context("failed to build OTLP metric exporter")?;
        builder.with_reader(
            sdkmetrics::PeriodicReader::builder(exporter)
                .with_interval(EXPORT_INTERVAL)
                .build(),
        )
    };

    Ok(builder.build())
}

/// Collector connection settings shared by the span and metric exporters.
#[cfg(feature = "otlp")]
struct OtlpTarget {
    endpoint: String,
    metadata: MetadataMap,
    compression: Compression,
}

#[cfg(feature = "otlp")]
impl OtlpTarget {
    fn from_env() -> anyhow::Result<Self> {
        use std::str::FromStr;

        let endpoint = std::env::var("OTLP_ENDPOINT").context("missing `OTLP_ENDPOINT`")?;
        let metadata = match std::env::var("OTLP_HEADERS") {
            Ok(raw) => parse_headers(&raw)?,
            Err(_) => MetadataMap::new(),
        };
        let compression = match std::env::var("OTLP_COMPRESSION") {
            Ok(raw) => Compression::from_str(&raw.to_ascii_lowercase())
                .context("invalid `OTLP_COMPRESSION`")?,
            Err(_) => Compression::Gzip,
        };

        Ok(Self {
            endpoint,
            metadata,
            compression,
        })
    }

    fn apply<B>(self, builder: B) -> B
    where
        B: WithExportConfig + WithTonicConfig,
    {
        let builder = if self.endpoint.starts_with("https://") {
            builder.with_tls_config(ClientTlsConfig::new().with_native_roots())
        } else {
            builder
        };

        builder
            .with_endpoint(self.endpoint)
            .with_protocol(Protocol::Grpc)
            .with_timeout(Duration::from_secs(10))
            .with_metadata(self.metadata)
            .with_compression(self.compression)
    }
}

/// Parses `key=value` pairs separated by commas into gRPC metadata.
#[cfg(feature = "otlp")]
fn parse_headers(raw: &str) -> anyhow::Result<MetadataMap> {
    let mut map = MetadataMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (name, value) = pair
            .split_once('=')
            .with_context(|| format!("expected `key=value` in `OTLP_HEADERS`, got `{pair}`"))?;
        let key = MetadataKey::<Ascii>::from_bytes(name.trim().to_ascii_lowercase().as_bytes())
            .with_context(|| format!("invalid header name `{name}`"))?;
        let value: MetadataValue<Ascii> = value
            .trim()
            .parse()
            .with_context(|| format!("invalid value for header `{name}`"))?;
        map.insert(key, value);
    }
    Ok(map)
}

// Metric handles - only compiled when metrics feature is enabled
#[cfg(feature = "metrics")]
static REQUESTS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static ERRORS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static BLOGS_STREAMED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static STREAMS_INFLIGHT: OnceLock<UpDownCounter<i64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static STREAM_DURATION_MS: OnceLock<Histogram<f64>> = OnceLock::new();

#[cfg(feature = "metrics")]
fn register_instruments(meter: &Meter) {
    let _ = REQUESTS.set(
        meter
            .u64_counter("requests")
            .with_description("Total gRPC requests")
            .build(),
    );

    let _ = ERRORS.set(
        meter
            .u64_counter("errors")
            .with_description("Requests or streams that ended with a non-OK status")
            .build(),
    );

    let _ = BLOGS_STREAMED.set(
        meter
            .u64_counter("blogs_streamed")
            .with_description("Blog posts delivered over ListBlogs")
            .build(),
    );

    let _ = STREAMS_INFLIGHT.set(
        meter
            .i64_up_down_counter("streams_inflight")
            .with_description("Concurrent ListBlogs streams")
            .build(),
    );

    let _ = STREAM_DURATION_MS.set(
        meter
            .f64_histogram("stream_duration")
            .with_unit("ms")
            .with_description("End-to-end stream duration")
            .build(),
    );
}

// Convenience functions that compile to no-ops when metrics are disabled
#[cfg(feature = "metrics")]
pub fn increment_requests(rpc: &'static str) {
    if let Some(counter) = REQUESTS.get() {
        counter.add(1, &[KeyValue::new("rpc", rpc)]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_requests(_rpc: &'static str) {}

#[cfg(feature = "metrics")]
pub fn increment_errors(rpc: &'static str) {
    if let Some(counter) = ERRORS.get() {
        counter.add(1, &[KeyValue::new("rpc", rpc)]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_errors(_rpc: &'static str) {}

#[cfg(feature = "metrics")]
pub fn increment_blogs_streamed() {
    if let Some(counter) = BLOGS_STREAMED.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_blogs_streamed() {}

#[cfg(feature = "metrics")]
pub fn increment_streams_inflight() {
    if let Some(counter) = STREAMS_INFLIGHT.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_streams_inflight() {}

#[cfg(feature = "metrics")]
pub fn decrement_streams_inflight() {
    if let Some(counter) = STREAMS_INFLIGHT.get() {
        counter.add(-1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn decrement_streams_inflight() {}

#[cfg(feature = "metrics")]
pub fn record_stream_duration(duration_ms: f64) {
    if let Some(histogram) = STREAM_DURATION_MS.get() {
        histogram.record(duration_ms, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_stream_duration(_duration_ms: f64) {}

#[cfg(all(test, feature = "otlp"))]
mod tests {
    use super::*;

    #[test]
    fn headers_become_lowercase_metadata() {
        let map = parse_headers("X-Honeycomb-Team=abc, x-honeycomb-dataset = blog ,").unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("x-honeycomb-team").unwrap(), "abc");
        assert_eq!(map.get("x-honeycomb-dataset").unwrap(), "blog");
    }

    #[test]
    fn malformed_headers_are_rejected() {
        assert!(parse_headers("no-equals-sign").is_err());
        assert!(parse_headers("bad key=value").is_err());
    }
}
