//! Logging setup for the agent fleet.
//!
//! Provides:
//! - Structured logging with JSON (bunyan-style) or pretty terminal output
//! - Secret string wrapper for redacting tokens and passwords
//!
//! All output goes to stderr so that stdout stays free for the fleet report.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! telemetry::init_default("agent_fleet").ok();
//! tracing::info!("Fleet starting");
//! ```
//!
//! # Configuration
//!
//! Environment variables:
//! - `RUST_LOG` - Log filter directive (default: "info")
//! - `LOG_FORMAT` - Output format: "json" or "pretty" (default: "pretty")
//! - `TEST_LOG` - If set, enables logs in test mode

pub mod config;
pub mod layers;
pub mod secrets;

pub use config::{LogFormat, TelemetryConfig};
pub use secrets::SecretString;

pub use tracing::subscriber::SetGlobalDefaultError;

use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Initialize logging from environment variables.
pub fn init_default(name: &str) -> Result<(), SetGlobalDefaultError> {
    init_with_config(name, TelemetryConfig::from_env())
}

/// Initialize logging with a custom default filter.
///
/// `RUST_LOG` still wins when it is set.
pub fn init_with_filter(name: &str, default_filter: &str) -> Result<(), SetGlobalDefaultError> {
    init_with_config(name, TelemetryConfig::from_env().with_filter(default_filter))
}

/// Initialize logging with full configuration control.
///
/// # Example
///
/// ```rust,no_run
/// use telemetry::{LogFormat, TelemetryConfig};
///
/// let config = TelemetryConfig::new()
///     .with_filter("fleet=debug")
///     .with_format(LogFormat::Json);
///
/// telemetry::init_with_config("agent_fleet", config).ok();
/// ```
pub fn init_with_config(name: &str, config: TelemetryConfig) -> Result<(), SetGlobalDefaultError> {
    // Redirect log crate to tracing
    let _ = LogTracer::init();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.filter));

    match config.format {
        LogFormat::Json => {
            let (storage_layer, formatting_layer) = layers::JsonLayer::layers(name);
            let subscriber = Registry::default()
                .with(env_filter)
                .with(storage_layer)
                .with(formatting_layer);
            tracing::subscriber::set_global_default(subscriber)
        }
        LogFormat::Pretty => {
            let subscriber = Registry::default()
                .with(env_filter)
                .with(layers::pretty_layer());
            tracing::subscriber::set_global_default(subscriber)
        }
    }
}

/// Initialize logging for tests.
///
/// Logs are suppressed unless `TEST_LOG` is set. Safe to call from every test.
pub fn init_test() {
    let config = TelemetryConfig::from_env().with_test_mode(true);

    if config.should_suppress_logs() {
        return;
    }

    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = LogTracer::init();

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.filter));

        let formatting_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_test_writer();

        let subscriber = Registry::default()
            .with(env_filter)
            .with(formatting_layer);

        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
