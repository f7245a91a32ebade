//! Configuration System using Figment
//!
//! Strongly-typed configuration for the analyzer driver. Configuration is
//! loaded from:
//! 1. a TOML file (base configuration, `config/pna.toml` by default)
//! 2. environment variables prefixed with `PNA_DAQ_`
//!
//! Nested keys are separated by a double underscore, so
//! `PNA_DAQ_APPLICATION__LOG_LEVEL=debug` overrides `application.log_level`.
//!
//! # Example
//! ```no_run
//! use pna_daq::config::PnaConfig;
//!
//! let config = PnaConfig::load()?;
//! config.validate()?;
//! println!("Instrument: {}:{}", config.instrument.host, config.instrument.port);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::error::{AppResult, PnaError};
use crate::hardware::pna::measurement::MeasurementName;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/pna.toml";

/// Upper bound on a single channel read request.
const MAX_READ_CHUNK_BYTES: usize = 1_000_000;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PnaConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// How to reach the instrument
    #[serde(default)]
    pub instrument: InstrumentConfig,
    /// Sweep acquisition tuning
    #[serde(default)]
    pub sweep: SweepConfig,
    /// Where flattened results are written
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log line format
    #[serde(default)]
    pub log_format: LogFormat,
}

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, colored output for interactive use
    Pretty,
    /// One line per event
    #[default]
    Compact,
    /// Newline-delimited JSON objects
    Json,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "PNA DAQ".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
        }
    }
}

/// Transport used to reach the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Raw SCPI socket (port 5025 on most analyzers)
    Tcp,
    /// In-process simulated analyzer
    Mock,
}

/// Instrument connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Transport kind
    #[serde(default = "default_transport")]
    pub transport: Transport,
    /// Hostname or IP address
    #[serde(default)]
    pub host: String,
    /// SCPI socket port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Per-operation I/O timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            host: String::new(),
            port: default_port(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl InstrumentConfig {
    /// I/O timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Sweep acquisition settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Prefix of the instrument-side parameter names owned by this driver
    #[serde(default = "default_parameter_prefix")]
    pub parameter_prefix: String,
    /// Maximum bytes requested per channel read while collecting a block
    #[serde(default = "default_read_chunk_bytes")]
    pub read_chunk_bytes: usize,
    /// Measurements defined by `initialize`
    #[serde(default = "default_measurements")]
    pub default_measurements: Vec<MeasurementName>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            parameter_prefix: default_parameter_prefix(),
            read_chunk_bytes: default_read_chunk_bytes(),
            default_measurements: default_measurements(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Output directory for CSV files
    pub output_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data"),
        }
    }
}

// Default value functions
fn default_transport() -> Transport {
    Transport::Mock
}

fn default_port() -> u16 {
    5025
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_parameter_prefix() -> String {
    "daq_".to_string()
}

fn default_read_chunk_bytes() -> usize {
    10_000
}

fn default_measurements() -> Vec<MeasurementName> {
    vec![MeasurementName::S21]
}

impl PnaConfig {
    /// Load configuration from `config/pna.toml` and environment variables
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// Missing keys fall back to `PnaConfig::default()`.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(PnaConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("PNA_DAQ_").split("__"))
            .extract()
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(PnaError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.instrument.transport == Transport::Tcp && self.instrument.host.trim().is_empty() {
            return Err(PnaError::Configuration(
                "instrument.host is required for the tcp transport".to_string(),
            ));
        }

        if self.instrument.timeout_ms == 0 {
            return Err(PnaError::Configuration(
                "instrument.timeout_ms must be positive".to_string(),
            ));
        }

        if !(1..=MAX_READ_CHUNK_BYTES).contains(&self.sweep.read_chunk_bytes) {
            return Err(PnaError::Configuration(format!(
                "Invalid read_chunk_bytes {}. Must be 1-{}",
                self.sweep.read_chunk_bytes, MAX_READ_CHUNK_BYTES
            )));
        }

        let prefix = &self.sweep.parameter_prefix;
        if prefix.is_empty() || prefix.contains(|c: char| matches!(c, '\'' | '"' | ',' | ';')) {
            return Err(PnaError::Configuration(format!(
                "Invalid parameter_prefix {:?}: must be non-empty and free of quotes, commas and semicolons",
                prefix
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PnaConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.instrument.transport, Transport::Mock);
        assert_eq!(config.sweep.read_chunk_bytes, 10_000);
        assert_eq!(config.sweep.default_measurements, vec![MeasurementName::S21]);
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = PnaConfig::default();
        config.application.log_level = "loud".to_string();
        assert!(matches!(
            config.validate(),
            Err(PnaError::Configuration(_))
        ));
    }

    #[test]
    fn test_tcp_requires_host() {
        let mut config = PnaConfig::default();
        config.instrument.transport = Transport::Tcp;
        assert!(config.validate().is_err());

        config.instrument.host = "192.168.1.50".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_chunk_size_bounds() {
        let mut config = PnaConfig::default();
        config.sweep.read_chunk_bytes = 0;
        assert!(config.validate().is_err());

        config.sweep.read_chunk_bytes = MAX_READ_CHUNK_BYTES + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_prefix_rejects_quote() {
        let mut config = PnaConfig::default();
        config.sweep.parameter_prefix = "bad'".to_string();
        assert!(config.validate().is_err());
    }
}
