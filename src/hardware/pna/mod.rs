//! Vector network analyzer driver.
//!
//! Drives Keysight/Agilent PNA-family analyzers (N5242A, N5230A, E8364B and
//! relatives) over a SCPI [`DeviceChannel`].
//!
//! `PnaDriver` is cheap to clone; clones share one channel. Every public
//! operation takes the channel lock for its whole conversation, so commands
//! from concurrent callers never interleave and a sweep in progress (including
//! its timed wait) holds the instrument until it finishes. Separate
//! instruments use separate drivers and share nothing.
//!
//! ## Accessors
//!
//! Configuration accessors follow one convention: `None` queries the current
//! value from the instrument, `Some(value)` writes it and returns the accepted
//! value. Inputs are validated before anything is written.
//!
//! # Example
//!
//! ```
//! use pna_daq::hardware::pna::{MeasurementSet, MockPna, PnaDriver, PnaSettings, SweepSpec, SweepType};
//!
//! # tokio_test::block_on(async {
//! let driver = PnaDriver::new(MockPna::new(), PnaSettings::default());
//! driver.initialize().await.unwrap();
//!
//! let spec = SweepSpec::new(SweepType::Linear, MeasurementSet::from_names(["S21"]));
//! let result = driver.sweep(&spec).await.unwrap();
//! assert_eq!(result.axis.len(), 201);
//! # })
//! ```

pub mod attenuation;
pub mod block;
pub mod measurement;
pub mod mock;
pub mod sweep;

pub use block::{SampleBlock, SampleFormat};
pub use measurement::{CatalogDiff, DefinedParameter, MeasurementName, MeasurementSet};
pub use mock::MockPna;
pub use sweep::{AxisKind, SweepResult, SweepSpec, SweepState, SweepTiming, SweepType, TraceData};

use crate::adapters::{DeviceChannel, TcpChannel};
use crate::config::{PnaConfig, SweepConfig, Transport};
use crate::data::ResultTable;
use crate::error::{AppResult, PnaError};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;

use measurement::parse_catalog;
use sweep::{
    frequency_range_command, linear_axis, parse_response, power_range_command, query_bounds,
    validate_frequency_range, SweepRun,
};

/// Bandwidth applied by [`PnaDriver::reset_measure`] when none is given, in Hz.
pub const DEFAULT_RESET_BANDWIDTH_HZ: f64 = 1000.0;

/// Driver-level settings derived from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PnaSettings {
    /// Prefix of parameter names this driver owns
    pub parameter_prefix: String,
    /// Maximum bytes per channel read
    pub read_chunk_bytes: usize,
    /// Measurements defined by [`PnaDriver::initialize`]
    pub default_measurements: MeasurementSet,
}

impl Default for PnaSettings {
    fn default() -> Self {
        Self::from(&SweepConfig::default())
    }
}

impl From<&SweepConfig> for PnaSettings {
    fn from(config: &SweepConfig) -> Self {
        Self {
            parameter_prefix: config.parameter_prefix.clone(),
            read_chunk_bytes: config.read_chunk_bytes,
            default_measurements: config.default_measurements.iter().copied().collect(),
        }
    }
}

/// Network analyzer driver.
#[derive(Clone)]
pub struct PnaDriver {
    channel: Arc<Mutex<Box<dyn DeviceChannel>>>,
    settings: Arc<PnaSettings>,
}

impl PnaDriver {
    /// Wrap an open channel.
    pub fn new<C: DeviceChannel + 'static>(channel: C, settings: PnaSettings) -> Self {
        Self::from_boxed(Box::new(channel), settings)
    }

    /// Wrap an already boxed channel.
    pub fn from_boxed(channel: Box<dyn DeviceChannel>, settings: PnaSettings) -> Self {
        tracing::debug!(channel = %channel.describe(), "Creating PNA driver");
        Self {
            channel: Arc::new(Mutex::new(channel)),
            settings: Arc::new(settings),
        }
    }

    /// Connect over a raw SCPI socket.
    pub async fn connect_tcp(
        host: &str,
        port: u16,
        timeout: std::time::Duration,
        settings: PnaSettings,
    ) -> AppResult<Self> {
        let channel = TcpChannel::connect(host, port, timeout).await?;
        Ok(Self::new(channel, settings))
    }

    /// Build a driver from validated configuration.
    ///
    /// The mock transport yields a fresh [`MockPna`].
    pub async fn from_config(config: &PnaConfig) -> AppResult<Self> {
        config.validate()?;
        let settings = PnaSettings::from(&config.sweep);
        match config.instrument.transport {
            Transport::Tcp => {
                Self::connect_tcp(
                    &config.instrument.host,
                    config.instrument.port,
                    config.instrument.timeout(),
                    settings,
                )
                .await
            }
            Transport::Mock => Ok(Self::new(MockPna::new(), settings)),
        }
    }

    /// Driver settings
    pub fn settings(&self) -> &PnaSettings {
        &self.settings
    }

    // =========================================================================
    // Setup
    // =========================================================================

    /// Select 64-bit binary trace transfer and define the default measurements.
    #[instrument(skip(self), err)]
    pub async fn initialize(&self) -> AppResult<MeasurementSet> {
        let mut channel = self.channel.lock().await;
        channel.write("FORM:DATA REAL,64").await?;
        self.synchronize_locked(&mut **channel, &self.settings.default_measurements)
            .await
    }

    /// `*IDN?`
    pub async fn identify(&self) -> AppResult<String> {
        self.channel.lock().await.query("*IDN?").await
    }

    /// Make the instrument catalog hold exactly the driver parameters for
    /// `desired`.
    ///
    /// Deletes every catalog entry whose measurement is not desired or whose
    /// name is reused for another measurement, then defines each desired
    /// measurement that has no parameter left. Returns the
    /// active set, which is `desired`.
    #[instrument(skip(self, desired), fields(desired = desired.len()), err)]
    pub async fn synchronize_measurements(
        &self,
        desired: &MeasurementSet,
    ) -> AppResult<MeasurementSet> {
        let mut channel = self.channel.lock().await;
        self.synchronize_locked(&mut **channel, desired).await
    }

    async fn synchronize_locked(
        &self,
        channel: &mut dyn DeviceChannel,
        desired: &MeasurementSet,
    ) -> AppResult<MeasurementSet> {
        let response = channel.query("CALC:PAR:CAT?").await?;
        let defined = parse_catalog(&response);
        let diff = CatalogDiff::compute(&defined, desired, &self.settings.parameter_prefix);

        if diff.is_empty() {
            tracing::debug!("Measurement catalog already in sync");
        } else {
            tracing::info!(
                deletions = diff.deletions.len(),
                additions = diff.additions.len(),
                "Synchronizing measurement catalog"
            );
        }

        for command in diff.commands() {
            channel.write(&command).await?;
        }
        Ok(desired.clone())
    }

    // =========================================================================
    // Sweeps
    // =========================================================================

    /// Run one sweep and fetch every requested measurement.
    ///
    /// The measurements must already be defined, see
    /// [`synchronize_measurements`](Self::synchronize_measurements).
    pub async fn sweep(&self, spec: &SweepSpec) -> AppResult<SweepResult> {
        let mut channel = self.channel.lock().await;
        self.sweep_locked(&mut **channel, spec).await
    }

    async fn sweep_locked(
        &self,
        channel: &mut dyn DeviceChannel,
        spec: &SweepSpec,
    ) -> AppResult<SweepResult> {
        SweepRun::new(
            channel,
            spec,
            &self.settings.parameter_prefix,
            self.settings.read_chunk_bytes,
        )?
        .run()
        .await
    }

    /// Run a sweep and flatten it into a table with metadata attached.
    ///
    /// Frequency and CW sweeps record the source power; power sweeps record
    /// the CW frequency. Bandwidth is recorded for all of them. The device
    /// stays locked from the sweep through the metadata queries.
    pub async fn sweep_table(&self, spec: &SweepSpec) -> AppResult<ResultTable> {
        let mut channel = self.channel.lock().await;
        let result = self.sweep_locked(&mut **channel, spec).await?;
        let mut table = result.to_table();

        match spec.sweep_type {
            SweepType::Power => {
                let frequency = query_f64(&mut **channel, "SENS:FREQ:CW?").await?;
                table.metadata.insert_parameter("frequency [Hz]", frequency);
            }
            _ => {
                let power = query_f64(&mut **channel, "SOUR:POW?").await?;
                table.metadata.insert_parameter("power [dBm]", power);
            }
        }
        let bandwidth = query_f64(&mut **channel, "SENS:BAND?").await?;
        table.metadata.insert_parameter("bandwidth [Hz]", bandwidth);
        Ok(table)
    }

    /// Read the current trace of one measurement without starting a sweep.
    ///
    /// The axis is the instrument's linear frequency window.
    #[instrument(skip(self), err)]
    pub async fn fetch_trace(&self, measurement: MeasurementName) -> AppResult<SweepResult> {
        let mut channel = self.channel.lock().await;
        let (start, stop) = query_bounds(&mut **channel, "SENS:FREQ:STAR?; STOP?").await?;
        let points: usize = query_parsed(&mut **channel, "SENS:SWE:POIN?").await?;

        let parameter = measurement.parameter_name(&self.settings.parameter_prefix);
        let samples =
            block::fetch_sdata(&mut **channel, &parameter, self.settings.read_chunk_bytes).await?;

        Ok(SweepResult {
            sweep_type: SweepType::Linear,
            axis: linear_axis(start, stop, points),
            measurements: vec![(measurement, samples)],
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// IF bandwidth in Hz.
    pub async fn bandwidth(&self, value: Option<f64>) -> AppResult<f64> {
        self.f64_setting("SENS:BAND", value).await
    }

    /// CW frequency in Hz.
    pub async fn cw_frequency(&self, value: Option<f64>) -> AppResult<f64> {
        self.f64_setting("SENS:FREQ:CW", value).await
    }

    /// Source power in dBm.
    pub async fn power(&self, value: Option<f64>) -> AppResult<f64> {
        self.f64_setting("SOUR:POW", value).await
    }

    /// Formatted-data phase offset in degrees.
    pub async fn phase_offset(&self, value: Option<f64>) -> AppResult<f64> {
        self.f64_setting("CALC:CORR:OFFS:PHAS", value).await
    }

    /// Source phase offset in degrees.
    pub async fn source_phase_offset(&self, value: Option<f64>) -> AppResult<f64> {
        self.f64_setting("SOUR:PHAS", value).await
    }

    /// Frequency window (start, stop) in Hz.
    ///
    /// Setting it also selects a linear sweep.
    pub async fn frequency_range(&self, value: Option<(f64, f64)>) -> AppResult<(f64, f64)> {
        match value {
            None => {
                let mut channel = self.channel.lock().await;
                query_bounds(&mut **channel, "SENS:FREQ:STAR?; STOP?").await
            }
            Some((start, stop)) => {
                validate_frequency_range(start, stop)?;
                let mut channel = self.channel.lock().await;
                channel.write("SENS:SWE:TYPE LIN").await?;
                channel.write(&frequency_range_command(start, stop)).await?;
                Ok((start, stop))
            }
        }
    }

    /// Power sweep window (start, stop) in dBm.
    ///
    /// Setting it picks the smallest source attenuation that can reach both
    /// bounds and selects a power sweep.
    pub async fn power_range(&self, value: Option<(f64, f64)>) -> AppResult<(f64, f64)> {
        match value {
            None => {
                let mut channel = self.channel.lock().await;
                query_bounds(&mut **channel, "SOUR:POW:STAR?; STOP?").await
            }
            Some((start, stop)) => {
                let command = power_range_command(start, stop)?;
                let mut channel = self.channel.lock().await;
                channel.write("SENS:SWE:TYPE POW").await?;
                channel.write(&command).await?;
                Ok((start, stop))
            }
        }
    }

    /// Points per sweep.
    pub async fn num_points(&self, value: Option<usize>) -> AppResult<usize> {
        let mut channel = self.channel.lock().await;
        match value {
            None => query_parsed(&mut **channel, "SENS:SWE:POIN?").await,
            Some(0) => Err(PnaError::Validation(
                "Point count must be at least 1".to_string(),
            )),
            Some(points) => {
                channel.write(&format!("SENS:SWE:POIN {}", points)).await?;
                Ok(points)
            }
        }
    }

    /// Sweeps averaged per group.
    ///
    /// Setting it also sets the trigger group count and turns averaging on
    /// for counts above one.
    pub async fn averages(&self, value: Option<u32>) -> AppResult<u32> {
        let mut channel = self.channel.lock().await;
        match value {
            None => query_parsed(&mut **channel, "SENS:AVER:COUN?").await,
            Some(0) => Err(PnaError::Validation(
                "Averaging count must be at least 1".to_string(),
            )),
            Some(count) => {
                channel.write(&format!("SENS:AVER:COUN {}", count)).await?;
                channel.write(&format!("SENS:SWE:GRO:COUN {}", count)).await?;
                let state = if count > 1 { "ON" } else { "OFF" };
                channel.write(&format!("SENS:AVER {}", state)).await?;
                Ok(count)
            }
        }
    }

    /// Electrical delay in nanoseconds.
    pub async fn electrical_delay(&self, value: Option<f64>) -> AppResult<f64> {
        match value {
            None => {
                let mut channel = self.channel.lock().await;
                let seconds = query_f64(&mut **channel, "CALC:CORR:EDEL:TIME?").await?;
                Ok(seconds * 1e9)
            }
            Some(ns) => {
                ensure_finite("electrical delay", ns)?;
                let mut channel = self.channel.lock().await;
                channel
                    .write(&format!("CALC:CORR:EDEL:TIME {}NS", ns))
                    .await?;
                Ok(ns)
            }
        }
    }

    /// Source output state.
    ///
    /// `state` is one of `0`, `1`, `ON`, `OFF` (case-insensitive). The
    /// returned value is always read back from the instrument.
    pub async fn output_state(&self, state: Option<&str>) -> AppResult<bool> {
        let requested = state.map(parse_output_flag).transpose()?;

        let mut channel = self.channel.lock().await;
        if let Some(on) = requested {
            channel
                .write(if on { "OUTP ON" } else { "OUTP OFF" })
                .await?;
        }
        let response = channel.query("OUTP?").await?;
        parse_output_flag(&response).map_err(|_| PnaError::response("OUTP?", response))
    }

    /// Return to continuous triggering with the source on.
    pub async fn reset_measure(&self, bandwidth: Option<f64>) -> AppResult<()> {
        let bandwidth = bandwidth.unwrap_or(DEFAULT_RESET_BANDWIDTH_HZ);
        ensure_finite("bandwidth", bandwidth)?;

        let mut channel = self.channel.lock().await;
        channel.write(&format!("SENS:BAND {}", bandwidth)).await?;
        channel.write("OUTP 1").await?;
        channel.write("INIT:CONT ON").await?;
        Ok(())
    }

    async fn f64_setting(&self, header: &str, value: Option<f64>) -> AppResult<f64> {
        match value {
            None => {
                let mut channel = self.channel.lock().await;
                query_f64(&mut **channel, &format!("{}?", header)).await
            }
            Some(v) => {
                ensure_finite(header, v)?;
                let mut channel = self.channel.lock().await;
                channel.write(&format!("{} {}", header, v)).await?;
                Ok(v)
            }
        }
    }
}

fn ensure_finite(what: &str, value: f64) -> AppResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(PnaError::Validation(format!(
            "{} must be finite, got {}",
            what, value
        )))
    }
}

/// Parse an on/off flag: `0`, `1`, `ON` or `OFF`.
pub fn parse_output_flag(flag: &str) -> AppResult<bool> {
    match flag.trim().to_ascii_uppercase().as_str() {
        "1" | "ON" => Ok(true),
        "0" | "OFF" => Ok(false),
        other => Err(PnaError::Validation(format!(
            "State must be 0, 1, \"ON\" or \"OFF\", got {:?}",
            other
        ))),
    }
}

async fn query_parsed<T: std::str::FromStr>(
    channel: &mut dyn DeviceChannel,
    command: &str,
) -> AppResult<T> {
    let response = channel.query(command).await?;
    parse_response(command, &response)
}

async fn query_f64(channel: &mut dyn DeviceChannel, command: &str) -> AppResult<f64> {
    query_parsed(channel, command).await
}
