//! Log output for the driver and CLI.
//!
//! The driver emits `tracing` events for every SCPI exchange (debug), every
//! sweep state transition (debug) and catalog changes (info). This module
//! installs the subscriber that renders them. `RUST_LOG` takes precedence over
//! the configured level so a single module can be turned up while debugging a
//! bus problem, e.g. `RUST_LOG=pna_daq::adapters=trace`.
//!
//! # Example
//! ```no_run
//! use pna_daq::{config::PnaConfig, logging};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PnaConfig::load()?;
//! logging::init_from_config(&config)?;
//! tracing::info!(host = %config.instrument.host, "Starting acquisition");
//! # Ok(())
//! # }
//! ```

use crate::config::{LogFormat, PnaConfig};
use crate::error::{AppResult, PnaError};
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Default maximum level when `RUST_LOG` is unset
    pub level: Level,
    /// Line format
    pub format: LogFormat,
    /// Also log span open/close, which shows the duration of each sweep
    pub span_timing: bool,
    /// Source file and line on every event
    pub source_location: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Compact,
            span_timing: false,
            source_location: false,
        }
    }
}

impl LogSettings {
    /// Settings from the `[application]` section.
    pub fn from_config(config: &PnaConfig) -> AppResult<Self> {
        let level = Level::from_str(config.application.log_level.trim()).map_err(|_| {
            PnaError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: trace, debug, info, warn, error",
                config.application.log_level
            ))
        })?;

        Ok(Self {
            level,
            format: config.application.log_format,
            ..Self::default()
        })
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_str().to_ascii_lowercase()))
    }

    fn layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let span_events = if self.span_timing {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let base = fmt::layer()
            .with_span_events(span_events)
            .with_file(self.source_location)
            .with_line_number(self.source_location);

        match self.format {
            LogFormat::Pretty => base.pretty().boxed(),
            LogFormat::Compact => base.compact().with_ansi(false).boxed(),
            LogFormat::Json => base.json().boxed(),
        }
    }
}

/// Install the global subscriber described by the configuration.
pub fn init_from_config(config: &PnaConfig) -> AppResult<()> {
    init(LogSettings::from_config(config)?)
}

/// Install the global subscriber.
///
/// Does nothing when a subscriber is already installed, so tests and
/// embedding applications can call it freely.
pub fn init(settings: LogSettings) -> AppResult<()> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    tracing_subscriber::registry()
        .with(settings.layer())
        .with(settings.filter())
        .try_init()
        .map_err(|e| PnaError::Configuration(format!("Failed to install log subscriber: {}", e)))
}
