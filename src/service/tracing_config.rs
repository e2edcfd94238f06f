use std::time::Duration;

use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::trace::SpanLimits;
use opentelemetry_sdk::{
    metrics::{
        reader::{DefaultAggregationSelector, DefaultTemporalitySelector},
        Aggregation, Instrument, MeterProviderBuilder, PeriodicReader, SdkMeterProvider, Stream,
    },
    runtime,
    trace::{BatchConfigBuilder, RandomIdGenerator, Sampler, Tracer},
    Resource,
};
use opentelemetry_semantic_conventions::{
    resource::{SERVICE_NAME, SERVICE_VERSION},
    SCHEMA_URL,
};
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_opentelemetry::{MetricsLayer, OpenTelemetryLayer};
use tracing_subscriber::fmt::time::ChronoLocal;

use dotenv::dotenv;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use super::{AppError, AppResult};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

fn resource() -> Resource {
    Resource::from_schema_url(
        [
            KeyValue::new(SERVICE_NAME, env!("CARGO_PKG_NAME")),
            KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
        ],
        SCHEMA_URL,
    )
}

/// `RUST_LOG` wins; otherwise everything at `default_level` and above.
fn env_filter(default_level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(default_level).into())
        .from_env_lossy()
}

// Construct MeterProvider for MetricsLayer
fn init_meter_provider() -> AppResult<SdkMeterProvider> {
    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .build_metrics_exporter(
            Box::new(DefaultAggregationSelector::new()),
            Box::new(DefaultTemporalitySelector::new()),
        )
        .map_err(|e| AppError::Telemetry(e.to_string()))?;

    let reader = PeriodicReader::builder(exporter, runtime::Tokio)
        .with_interval(Duration::from_secs(30))
        .build();

    // JPEG sizes: 16 KiB up to the default 1 MiB frame buffer
    let view_frame_bytes = |instrument: &Instrument| -> Option<Stream> {
        if instrument.name == "frame_bytes" {
            Some(
                Stream::new()
                    .name("frame_bytes")
                    .aggregation(Aggregation::ExplicitBucketHistogram {
                        boundaries: vec![
                            16384.0, 32768.0, 65536.0, 131072.0, 262144.0, 524288.0, 1048576.0,
                        ],
                        record_min_max: true,
                    }),
            )
        } else {
            None
        }
    };

    let meter_provider = MeterProviderBuilder::default()
        .with_resource(resource())
        .with_reader(reader)
        .with_view(view_frame_bytes)
        .build();

    global::set_meter_provider(meter_provider.clone());

    Ok(meter_provider)
}

// Construct Tracer for OpenTelemetryLayer
fn init_tracer() -> AppResult<Tracer> {
    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_batch_config(
            BatchConfigBuilder::default()
                .with_scheduled_delay(Duration::from_secs(5))
                .build(),
        )
        .with_trace_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
                    1.0,
                ))))
                .with_id_generator(RandomIdGenerator::default())
                .with_span_limits(SpanLimits::default())
                .with_resource(resource()),
        )
        .with_exporter(opentelemetry_otlp::new_exporter().tonic())
        .install_batch(runtime::Tokio)
        .map_err(|e| AppError::Telemetry(e.to_string()))
}

/// Flushes log files and, when enabled, the OTLP providers on drop.
pub struct OtelGuard {
    meter_provider: Option<SdkMeterProvider>,
    _worker_guard: WorkerGuard,
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        if let Some(meter_provider) = self.meter_provider.take() {
            if let Err(err) = meter_provider.shutdown() {
                eprintln!("{err:?}");
            }
            opentelemetry::global::shutdown_tracer_provider();
            tracing::info!("shutdown otel tracer provider");
        }
    }
}

/// Console-only tracing, for tests and embedding.
pub fn setup_local_tracing() -> AppResult<()> {
    dotenv().ok();
    let timer = ChronoLocal::new(TIMESTAMP_FORMAT.to_string());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(timer)
        .with_target(true)
        .with_thread_names(true)
        .with_line_number(true);
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter(Level::INFO))
        .try_init()
        .map_err(|e| AppError::Telemetry(e.to_string()))
}

/// Console plus hourly rolling log files under `log_dir`; with `otlp`, also
/// exports spans and metric events over OTLP. Needs a tokio runtime.
pub async fn setup_tracing(log_dir: &str, default_level: Level, otlp: bool) -> AppResult<OtelGuard> {
    let file_appender = tracing_appender::rolling::hourly(log_dir, "mjpeg-proxy.log");
    let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
    let writer = non_blocking.and(std::io::stdout);

    let timer = ChronoLocal::new(TIMESTAMP_FORMAT.to_string());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(timer)
        .with_target(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(true)
        .with_writer(writer);

    let (meter_provider, tracer) = if otlp {
        (Some(init_meter_provider()?), Some(init_tracer()?))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(meter_provider.clone().map(MetricsLayer::new))
        .with(tracer.map(OpenTelemetryLayer::new))
        .with(env_filter(default_level))
        .try_init()
        .map_err(|e| AppError::Telemetry(e.to_string()))?;

    Ok(OtelGuard {
        meter_provider,
        _worker_guard: worker_guard,
    })
}
