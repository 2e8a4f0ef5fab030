//! Tracing Infrastructure
//!
//! Structured logging for the service and the CLI, built on `tracing` and
//! `tracing-subscriber`. Scan-worker lines carry the `acquisition-scan` thread
//! name and the `identity`/`device`/`error` fields set at the call sites.
//!
//! `application.log_level` and `application.log_format` select the level and
//! output; `RUST_LOG` overrides the level.
//!
//! # Example
//! ```no_run
//! use daq_acquire::{config::AcquireConfig, logging};
//! use tracing::info;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AcquireConfig::load()?;
//! logging::init_from_config(&config)?;
//! info!("Application started");
//! # Ok(())
//! # }
//! ```

use std::io::IsTerminal;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::AcquireConfig;
use crate::error::{AcquireError, AcquireResult};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Multi-line with source locations, for reading at a terminal
    Pretty,
    /// One line per event
    Compact,
    /// One JSON object per event, for log collectors
    Json,
}

/// Subscriber settings
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Default level when `RUST_LOG` is unset
    pub level: Level,
    pub format: OutputFormat,
    /// Colored output (ignored for JSON)
    pub with_ansi: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: OutputFormat::Compact,
            with_ansi: false,
        }
    }
}

impl TracingConfig {
    /// Settings from the `application` section. Colors only when stdout is a terminal.
    pub fn from_config(config: &AcquireConfig) -> AcquireResult<Self> {
        Ok(Self {
            level: parse_log_level(&config.application.log_level)?,
            format: parse_log_format(&config.application.log_format)?,
            with_ansi: std::io::stdout().is_terminal(),
        })
    }
}

/// Initialize tracing from the application configuration
pub fn init_from_config(config: &AcquireConfig) -> AcquireResult<()> {
    init(TracingConfig::from_config(config)?)
}

/// Install the global subscriber.
///
/// Returns `Ok(())` if one is already installed, so tests and embedding
/// applications can call it freely.
pub fn init(config: TracingConfig) -> AcquireResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str().to_lowercase()));

    let layer = match config.format {
        OutputFormat::Pretty => fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_thread_names(true)
            .with_ansi(config.with_ansi)
            .boxed(),
        OutputFormat::Compact => fmt::layer()
            .compact()
            .with_thread_names(true)
            .with_ansi(config.with_ansi)
            .boxed(),
        OutputFormat::Json => fmt::layer().json().with_thread_names(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(env_filter))
        .try_init()
        .or_else(|e| {
            if e.to_string().contains("a global default trace dispatcher has already been set") {
                Ok(())
            } else {
                Err(AcquireError::Tracing(e.to_string()))
            }
        })
}

/// Parse a `log_level` value (case-insensitive).
pub(crate) fn parse_log_level(level: &str) -> AcquireResult<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(AcquireError::Configuration(format!(
            "Invalid log_level '{level}'. Must be one of: trace, debug, info, warn, error"
        ))),
    }
}

/// Parse a `log_format` value (case-insensitive).
pub(crate) fn parse_log_format(format: &str) -> AcquireResult<OutputFormat> {
    match format.to_lowercase().as_str() {
        "pretty" => Ok(OutputFormat::Pretty),
        "compact" => Ok(OutputFormat::Compact),
        "json" => Ok(OutputFormat::Json),
        _ => Err(AcquireError::Configuration(format!(
            "Invalid log_format '{format}'. Must be one of: pretty, compact, json"
        ))),
    }
}
