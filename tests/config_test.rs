//! Configuration loading: TOML file, environment overrides, validation.

use pna_daq::config::{LogFormat, PnaConfig, Transport};
use pna_daq::hardware::pna::MeasurementName;
use pna_daq::PnaError;
use serial_test::serial;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_loads_values_from_toml() {
    let file = write_config(
        r#"
        [application]
        name = "bench"
        log_level = "debug"
        log_format = "json"

        [instrument]
        transport = "tcp"
        host = "10.0.0.7"
        timeout_ms = 1500

        [sweep]
        parameter_prefix = "bench_"
        default_measurements = ["S21", "S12"]
        "#,
    );

    let config = PnaConfig::load_from(file.path()).unwrap();
    assert_eq!(config.application.log_level, "debug");
    assert_eq!(config.application.log_format, LogFormat::Json);
    assert_eq!(config.instrument.transport, Transport::Tcp);
    assert_eq!(config.instrument.host, "10.0.0.7");
    assert_eq!(config.instrument.port, 5025);
    assert_eq!(config.instrument.timeout().as_millis(), 1500);
    assert_eq!(config.sweep.parameter_prefix, "bench_");
    assert_eq!(
        config.sweep.default_measurements,
        vec![MeasurementName::S21, MeasurementName::S12]
    );
    assert_eq!(config.sweep.read_chunk_bytes, 10_000);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn test_missing_file_falls_back_to_defaults() {
    let config = PnaConfig::load_from("does/not/exist.toml").unwrap();
    assert_eq!(config.instrument.transport, Transport::Mock);
    assert_eq!(config.application.log_format, LogFormat::Compact);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let file = write_config(
        r#"
        [instrument]
        transport = "tcp"
        host = "10.0.0.7"
        "#,
    );

    std::env::set_var("PNA_DAQ_INSTRUMENT__HOST", "192.168.1.50");
    std::env::set_var("PNA_DAQ_SWEEP__READ_CHUNK_BYTES", "4096");
    let result = PnaConfig::load_from(file.path());
    std::env::remove_var("PNA_DAQ_INSTRUMENT__HOST");
    std::env::remove_var("PNA_DAQ_SWEEP__READ_CHUNK_BYTES");

    let config = result.unwrap();
    assert_eq!(config.instrument.host, "192.168.1.50");
    assert_eq!(config.sweep.read_chunk_bytes, 4096);
}

#[test]
#[serial]
fn test_semantic_errors_surface_from_validate() {
    let file = write_config(
        r#"
        [instrument]
        transport = "tcp"

        [sweep]
        read_chunk_bytes = 0
        "#,
    );

    let config = PnaConfig::load_from(file.path()).unwrap();
    let err = config.validate().unwrap_err();
    assert!(matches!(err, PnaError::Configuration(_)));
    assert!(err.is_bad_input());
}

#[test]
#[serial]
fn test_unknown_measurement_in_file_is_a_load_error() {
    let file = write_config(
        r#"
        [sweep]
        default_measurements = ["S33"]
        "#,
    );
    assert!(PnaConfig::load_from(file.path()).is_err());
}

#[test]
#[serial]
fn test_shipped_config_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/pna.toml");
    let config = PnaConfig::load_from(path).unwrap();
    assert!(config.validate().is_ok());
}
