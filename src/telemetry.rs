use crate::config::{LogFormat, TelemetryConfig};
use opentelemetry::global;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Name every meter in this process registers against.
pub const METER_NAME: &str = "lawcast-server";

/// Holds the meter provider so metrics can be flushed on shutdown.
#[derive(Debug)]
pub struct TelemetryGuard {
    meter_provider: SdkMeterProvider,
}

impl TelemetryGuard {
    pub fn shutdown(self) {
        if let Err(e) = self.meter_provider.shutdown() {
            tracing::warn!(error = %e, "Failed to shut down meter provider");
        }
    }
}

/// Initializes the tracing subscriber and the in-process metrics provider.
///
/// # Errors
/// Returns an error if a subscriber was already installed.
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<TelemetryGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into())
        .add_directive("sqlx=warn".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);

    let registry = Registry::default().with(filter);
    match config.log_format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init()?,
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init()?,
    }

    let meter_provider = SdkMeterProvider::builder().build();
    global::set_meter_provider(meter_provider.clone());

    Ok(TelemetryGuard { meter_provider })
}

/// Installs a no-op meter provider for tests to silence warnings.
pub fn init_test_telemetry() {
    let provider = SdkMeterProvider::builder().build();
    global::set_meter_provider(provider);
}
