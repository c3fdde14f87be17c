//! Subscriber assembly.

use super::export::FileSpanExporter;
use super::rotation::RotatingFile;
use crate::infrastructure::resolve_in_data_dir;
use crate::Config;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_sdk::resource::Resource;
use opentelemetry_sdk::trace::{Tracer, TracerProvider};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub(super) const SERVICE_NAME: &str = "lifecycle-manager";

/// Installs the global subscriber.
///
/// Idempotent: only the first call in a process takes effect. A trace file
/// that cannot be created disables export but keeps stderr logging.
///
/// ```rust
/// use lifecycle_manager::observability::init_tracing;
/// use lifecycle_manager::Config;
///
/// init_tracing(&Config {
///     trace_level: Some("lifecycle_manager=debug".to_string()),
///     ..Config::default()
/// });
/// tracing::debug!("tracing is active");
/// ```
pub fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = config.trace_level.as_deref().unwrap_or("info");
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
    });

    let otel_layer = file_tracer(config).map(OpenTelemetryLayer::new);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(otel_layer)
        .try_init();
}

fn file_tracer(config: &Config) -> Option<Tracer> {
    let path = resolve_in_data_dir(config.trace_file.as_deref()?);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok()?;
    }

    let resource = Resource::new(vec![KeyValue::new("service.name", SERVICE_NAME)]);
    let file = RotatingFile::new(path, config.trace_max_bytes, config.trace_backups);
    let provider = TracerProvider::builder()
        .with_config(opentelemetry_sdk::trace::Config::default().with_resource(resource.clone()))
        .with_simple_exporter(FileSpanExporter::new(file, resource))
        .build();
    Some(provider.tracer(SERVICE_NAME))
}
