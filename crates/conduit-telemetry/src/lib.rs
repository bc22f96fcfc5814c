use std::fmt;
use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Output encoding for log lines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable text.
    Pretty,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            _ => Err(TelemetryError::UnknownFormat(s.to_owned())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("unknown log format {0:?} (expected json or pretty)")]
    UnknownFormat(String),
    #[error("failed to install tracing subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "conduit_host" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    pub format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            format: LogFormat::default(),
        }
    }
}

/// Returned by [`init_telemetry`]; records what was installed.
#[derive(Debug)]
pub struct TelemetryGuard {
    directive: String,
    format: LogFormat,
}

impl TelemetryGuard {
    /// Filter directive in effect (RUST_LOG when set, else the configured one).
    pub fn directive(&self) -> &str {
        &self.directive
    }

    pub fn format(&self) -> LogFormat {
        self.format
    }
}

/// Build the filter directive from config, e.g. `info,conduit_host=debug`.
pub fn filter_directive(config: &TelemetryConfig) -> String {
    let mut directive = config.log_level.to_string().to_lowercase();
    for (module, level) in &config.module_levels {
        directive.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
    }
    directive
}

/// Install the global tracing subscriber. Call once at startup.
///
/// Logs go to stderr so stdout stays free for delivered script calls.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let configured = filter_directive(config);
    let (env_filter, directive) = match EnvFilter::try_from_default_env() {
        Ok(filter) => {
            let directive = filter.to_string();
            (filter, directive)
        }
        Err(_) => (EnvFilter::new(&configured), configured),
    };

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(env_filter))
        .try_init()?;

    Ok(TelemetryGuard {
        directive,
        format: config.format,
    })
}
