use std::io::IsTerminal;
use tracing::Level;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the logging system
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level for this crate (default: INFO)
    pub level: Level,
    /// Emit one JSON object per log event
    pub json_format: bool,
    /// Colorize output when stderr is a terminal
    pub colorize: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            colorize: std::io::stderr().is_terminal(),
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`. Logs go to stderr so that
/// the run summary on stdout stays clean.
pub fn init_logging(config: LoggingConfig) {
    let level_filter = match config.level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("birads_prep={}", level_filter)));

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.colorize)
        .with_target(false)
        .with_timer(ChronoUtc::new("%Y-%m-%d %H:%M:%S".to_string()));

    let layer = if config.json_format {
        layer.json().flatten_event(true).boxed()
    } else {
        layer.boxed()
    };

    // Ignore the error so repeated initialization (e.g. in tests) is harmless
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init();
}

/// Parse a `--log-level` value
pub fn parse_level(value: &str) -> Level {
    match value.to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}
