//! Logging configuration

use std::str::FromStr;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable terminal output
    #[default]
    Pretty,
    /// Bunyan-style JSON lines
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" | "bunyan" => Ok(LogFormat::Json),
            "pretty" | "text" | "" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub filter: String,
    /// Output format
    pub format: LogFormat,
    /// Running under `cargo test`
    pub test_mode: bool,
    /// `TEST_LOG` was set
    pub test_log: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Pretty,
            test_mode: false,
            test_log: false,
        }
    }
}

impl TelemetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `LOG_FORMAT` and `TEST_LOG`.
    ///
    /// An unrecognized `LOG_FORMAT` falls back to pretty output.
    pub fn from_env() -> Self {
        let format = std::env::var("LOG_FORMAT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();

        Self {
            format,
            test_log: std::env::var_os("TEST_LOG").is_some(),
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    /// Tests stay quiet unless `TEST_LOG` is set
    pub fn should_suppress_logs(&self) -> bool {
        self.test_mode && !self.test_log
    }
}
