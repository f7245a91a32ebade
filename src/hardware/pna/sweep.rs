//! Sweep orchestration.
//!
//! A sweep is driven through an explicit state machine:
//!
//! ```text
//! Configuring -> Waiting -> Confirming -> Fetching -> Restoring -> Done
//! ```
//!
//! - **Configuring** applies any requested range, reads the axis bounds, turns
//!   the source on, selects the sweep type and arms a sweep group. Sweep time,
//!   point count and averaging count are read back from the instrument.
//! - **Waiting** sleeps for the expected acquisition time (scaled by the
//!   number of driven ports) when it exceeds one second. This only avoids
//!   polling early; it is not a timeout.
//! - **Confirming** blocks on `*OPC?`, which the instrument only answers once
//!   the group is complete.
//! - **Fetching** reads one block per requested measurement, in caller order.
//! - **Restoring** turns the source back off.
//!
//! Every value used to build the axis is queried fresh on each call. If any
//! step fails after the source was turned on, a best-effort `OUTP OFF` is
//! issued before the original error is returned.

use crate::adapters::DeviceChannel;
use crate::data::ResultTable;
use crate::error::{AppResult, PnaError};
use crate::hardware::pna::attenuation::select_attenuation;
use crate::hardware::pna::block::{fetch_phase, fetch_sdata, SampleBlock};
use crate::hardware::pna::measurement::{MeasurementName, MeasurementSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::instrument;

/// Expected acquisitions at or below this many seconds are polled immediately.
const WAIT_THRESHOLD_SECONDS: f64 = 1.0;

/// Device sweep mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepType {
    /// Linear frequency sweep
    Linear,
    /// Logarithmic frequency sweep
    Logarithmic,
    /// Source power sweep at fixed frequency
    Power,
    /// Repeated acquisitions at a fixed frequency and power
    ContinuousWave,
}

impl SweepType {
    /// Token for `SENS:SWE:TYPE`.
    pub fn scpi_token(&self) -> &'static str {
        match self {
            SweepType::Linear => "LIN",
            SweepType::Logarithmic => "LOG",
            SweepType::Power => "POW",
            SweepType::ContinuousWave => "CW",
        }
    }

    /// Quantity on the independent axis.
    pub fn axis_kind(&self) -> AxisKind {
        match self {
            SweepType::Linear | SweepType::Logarithmic => AxisKind::Frequency,
            SweepType::Power => AxisKind::Power,
            SweepType::ContinuousWave => AxisKind::TimeIndex,
        }
    }
}

impl fmt::Display for SweepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scpi_token())
    }
}

impl FromStr for SweepType {
    type Err = PnaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lin" | "linear" => Ok(SweepType::Linear),
            "log" | "logarithmic" => Ok(SweepType::Logarithmic),
            "pow" | "power" => Ok(SweepType::Power),
            "cw" | "continuous" | "continuouswave" => Ok(SweepType::ContinuousWave),
            other => Err(PnaError::Validation(format!(
                "Unknown sweep type '{}'. Expected linear, log, power or cw",
                other
            ))),
        }
    }
}

/// Independent axis quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisKind {
    /// Hz
    Frequency,
    /// dBm
    Power,
    /// Acquisition index
    TimeIndex,
}

impl AxisKind {
    /// Column label with unit.
    pub fn label(&self) -> &'static str {
        match self {
            AxisKind::Frequency => "frequency [Hz]",
            AxisKind::Power => "power [dBm]",
            AxisKind::TimeIndex => "index",
        }
    }
}

/// Which trace data to fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TraceData {
    /// Complex S-parameters (`SDATA`)
    #[default]
    SParameters,
    /// Phase-formatted real data (`FDATA` after `CALC:FORM PHAS`)
    Phase,
}

/// One sweep request.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepSpec {
    /// Device sweep mode
    pub sweep_type: SweepType,
    /// Measurements to fetch, in result order
    pub measurements: MeasurementSet,
    /// Trace data variant
    pub data: TraceData,
    /// Axis bounds to apply before sweeping
    pub range: Option<(f64, f64)>,
}

impl SweepSpec {
    /// S-parameter sweep over the instrument's current range.
    pub fn new(sweep_type: SweepType, measurements: MeasurementSet) -> Self {
        Self {
            sweep_type,
            measurements,
            data: TraceData::SParameters,
            range: None,
        }
    }

    /// Fetch phase-formatted data instead of S-parameters.
    pub fn with_data(mut self, data: TraceData) -> Self {
        self.data = data;
        self
    }

    /// Apply axis bounds before sweeping.
    ///
    /// Frequency bounds for linear and log sweeps, power bounds for power
    /// sweeps. Ignored for CW.
    pub fn with_range(mut self, start: f64, stop: f64) -> Self {
        self.range = Some((start, stop));
        self
    }
}

/// Acquisition timing reported by the instrument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepTiming {
    /// Seconds per single sweep
    pub per_sweep_seconds: f64,
    /// Points per sweep
    pub point_count: usize,
    /// Sweeps combined per group, at least 1
    pub averaging_count: u32,
}

impl SweepTiming {
    /// Parse the `SENS:SWE:TIME?; POIN?` and `SENS:AVER:COUN?` replies.
    pub fn from_responses(time_points: &str, averages: &str) -> AppResult<Self> {
        let (time, points) = split_pair(TIMING_QUERY, time_points)?;

        let per_sweep_seconds: f64 = parse_number(TIMING_QUERY, time_points, time)?;
        if !per_sweep_seconds.is_finite() || per_sweep_seconds < 0.0 {
            return Err(PnaError::response(TIMING_QUERY, time_points));
        }

        let point_count: usize = parse_number(TIMING_QUERY, time_points, points)?;
        if point_count == 0 {
            return Err(PnaError::response(TIMING_QUERY, time_points));
        }

        let reported: u32 = parse_number(AVERAGES_QUERY, averages, averages)?;
        let averaging_count = if reported == 0 {
            tracing::warn!("Instrument reported 0 averages; treating as 1");
            1
        } else {
            reported
        };

        Ok(Self {
            per_sweep_seconds,
            point_count,
            averaging_count,
        })
    }

    /// Expected seconds for one sweep group.
    pub fn total_seconds(&self) -> f64 {
        self.per_sweep_seconds * f64::from(self.averaging_count)
    }

    /// Time to sleep before polling for completion, if any.
    pub fn wait_duration(&self, port_factor: usize) -> Option<Duration> {
        let total = self.total_seconds();
        if total > WAIT_THRESHOLD_SECONDS {
            Some(Duration::from_secs_f64(total * port_factor as f64))
        } else {
            None
        }
    }
}

/// Decoded sweep output.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepResult {
    /// Mode the sweep ran in
    pub sweep_type: SweepType,
    /// Axis values, one per point
    pub axis: Vec<f64>,
    /// Samples per measurement, in request order
    pub measurements: Vec<(MeasurementName, SampleBlock)>,
}

impl SweepResult {
    /// Samples for one measurement.
    pub fn get(&self, measurement: MeasurementName) -> Option<&SampleBlock> {
        self.measurements
            .iter()
            .find(|(name, _)| *name == measurement)
            .map(|(_, block)| block)
    }

    /// Number of points per trace
    pub fn point_count(&self) -> usize {
        self.axis.len()
    }

    /// Independent axis quantity
    pub fn axis_kind(&self) -> AxisKind {
        self.sweep_type.axis_kind()
    }

    /// Flatten into a table with one row per point.
    pub fn to_table(&self) -> ResultTable {
        ResultTable::from_result(self)
    }
}

/// Sweep state with the data each state carries forward.
#[derive(Debug)]
pub enum SweepState {
    /// About to configure the instrument
    Configuring,
    /// Acquisition armed; optionally sleeping before the completion poll
    Waiting {
        /// Precomputed axis
        axis: Vec<f64>,
        /// Reported timing
        timing: SweepTiming,
    },
    /// Blocking on `*OPC?`
    Confirming {
        /// Precomputed axis
        axis: Vec<f64>,
    },
    /// Reading trace blocks
    Fetching {
        /// Precomputed axis
        axis: Vec<f64>,
    },
    /// Turning the source back off
    Restoring {
        /// Completed result
        result: SweepResult,
    },
    /// Finished
    Done(SweepResult),
}

impl SweepState {
    /// Short state name for logs
    pub fn name(&self) -> &'static str {
        match self {
            SweepState::Configuring => "configuring",
            SweepState::Waiting { .. } => "waiting",
            SweepState::Confirming { .. } => "confirming",
            SweepState::Fetching { .. } => "fetching",
            SweepState::Restoring { .. } => "restoring",
            SweepState::Done(_) => "done",
        }
    }
}

const TIMING_QUERY: &str = "SENS:SWE:TIME?; POIN?";
const AVERAGES_QUERY: &str = "SENS:AVER:COUN?";
const FREQUENCY_BOUNDS_QUERY: &str = "SENS:FREQ:STAR?; STOP?";
const POWER_BOUNDS_QUERY: &str = "SOUR:POW:STAR?; STOP?";

/// One sweep conversation over an exclusively held channel.
pub(crate) struct SweepRun<'a> {
    channel: &'a mut dyn DeviceChannel,
    spec: &'a SweepSpec,
    prefix: &'a str,
    chunk: usize,
    range_command: Option<String>,
    output_enabled: bool,
}

impl<'a> SweepRun<'a> {
    /// Validate the request. Nothing is written to the instrument here.
    pub(crate) fn new(
        channel: &'a mut dyn DeviceChannel,
        spec: &'a SweepSpec,
        prefix: &'a str,
        chunk: usize,
    ) -> AppResult<Self> {
        let range_command = match (spec.range, spec.sweep_type) {
            (None, _) | (Some(_), SweepType::ContinuousWave) => None,
            (Some((start, stop)), SweepType::Power) => Some(power_range_command(start, stop)?),
            (Some((start, stop)), sweep_type) => {
                validate_frequency_range(start, stop)?;
                if sweep_type == SweepType::Logarithmic && start <= 0.0 {
                    return Err(PnaError::Validation(
                        "Logarithmic sweeps need a positive start frequency".to_string(),
                    ));
                }
                Some(frequency_range_command(start, stop))
            }
        };

        Ok(Self {
            channel,
            spec,
            prefix,
            chunk,
            range_command,
            output_enabled: false,
        })
    }

    /// Drive the state machine to completion.
    #[instrument(
        skip(self),
        fields(
            sweep_type = %self.spec.sweep_type,
            measurements = self.spec.measurements.len(),
        ),
        err
    )]
    pub(crate) async fn run(mut self) -> AppResult<SweepResult> {
        let mut state = SweepState::Configuring;
        loop {
            state = match self.step(state).await {
                Ok(SweepState::Done(result)) => return Ok(result),
                Ok(next) => {
                    tracing::debug!(state = next.name(), "Sweep state transition");
                    next
                }
                Err(err) => {
                    self.abort().await;
                    return Err(err);
                }
            };
        }
    }

    async fn step(&mut self, state: SweepState) -> AppResult<SweepState> {
        match state {
            SweepState::Configuring => self.configure().await,
            SweepState::Waiting { axis, timing } => {
                let port_factor = self.spec.measurements.port_factor();
                if let Some(wait) = timing.wait_duration(port_factor) {
                    tracing::info!(
                        seconds = wait.as_secs_f64(),
                        port_factor,
                        "Waiting for sweep to complete"
                    );
                    tokio::time::sleep(wait).await;
                }
                Ok(SweepState::Confirming { axis })
            }
            SweepState::Confirming { axis } => {
                self.channel.query_unbounded("*OPC?").await?;
                Ok(SweepState::Fetching { axis })
            }
            SweepState::Fetching { axis } => {
                let measurements = self.fetch_all(axis.len()).await?;
                Ok(SweepState::Restoring {
                    result: SweepResult {
                        sweep_type: self.spec.sweep_type,
                        axis,
                        measurements,
                    },
                })
            }
            SweepState::Restoring { result } => {
                self.channel.write("OUTP OFF").await?;
                self.output_enabled = false;
                Ok(SweepState::Done(result))
            }
            SweepState::Done(result) => Ok(SweepState::Done(result)),
        }
    }

    async fn configure(&mut self) -> AppResult<SweepState> {
        if let Some(command) = &self.range_command {
            self.channel.write(command).await?;
        }

        let bounds = match self.spec.sweep_type.axis_kind() {
            AxisKind::Frequency => Some(query_bounds(self.channel, FREQUENCY_BOUNDS_QUERY).await?),
            AxisKind::Power => Some(query_bounds(self.channel, POWER_BOUNDS_QUERY).await?),
            AxisKind::TimeIndex => None,
        };

        self.output_enabled = true;
        self.channel
            .write("SENS:SWE:TIME:AUTO ON; :INIT:CONT ON; :OUTP ON")
            .await?;
        let time_points = self.channel.query(TIMING_QUERY).await?;
        self.channel
            .write(&format!("SENS:SWE:TYPE {}", self.spec.sweep_type.scpi_token()))
            .await?;
        let averages = self.channel.query(AVERAGES_QUERY).await?;
        self.channel.write("ABORT;SENS:SWE:MODE GRO").await?;

        let timing = SweepTiming::from_responses(&time_points, &averages)?;
        tracing::debug!(
            per_sweep_seconds = timing.per_sweep_seconds,
            points = timing.point_count,
            averages = timing.averaging_count,
            "Sweep armed"
        );

        let axis = match (self.spec.sweep_type, bounds) {
            (SweepType::Logarithmic, Some((start, stop))) => {
                log_axis(start, stop, timing.point_count).ok_or_else(|| {
                    PnaError::response(FREQUENCY_BOUNDS_QUERY, format!("{};{}", start, stop))
                })?
            }
            (_, Some((start, stop))) => linear_axis(start, stop, timing.point_count),
            (_, None) => (0..timing.point_count).map(|i| i as f64).collect(),
        };

        Ok(SweepState::Waiting { axis, timing })
    }

    async fn fetch_all(
        &mut self,
        point_count: usize,
    ) -> AppResult<Vec<(MeasurementName, SampleBlock)>> {
        let mut measurements = Vec::with_capacity(self.spec.measurements.len());
        for measurement in self.spec.measurements.iter() {
            let parameter = measurement.parameter_name(self.prefix);
            let block = match self.spec.data {
                TraceData::SParameters => fetch_sdata(self.channel, &parameter, self.chunk).await?,
                TraceData::Phase => fetch_phase(self.channel, &parameter, self.chunk).await?,
            };
            if block.len() != point_count {
                return Err(PnaError::Framing(format!(
                    "{} returned {} samples for a {} point sweep",
                    measurement,
                    block.len(),
                    point_count
                )));
            }
            measurements.push((measurement, block));
        }
        Ok(measurements)
    }

    async fn abort(&mut self) {
        if !self.output_enabled {
            return;
        }
        if let Err(err) = self.channel.write("OUTP OFF").await {
            tracing::warn!(error = %err, "Failed to disable output after sweep error");
        }
        self.output_enabled = false;
    }
}

/// Query a `STAR?; STOP?` pair.
pub(crate) async fn query_bounds(
    channel: &mut dyn DeviceChannel,
    command: &str,
) -> AppResult<(f64, f64)> {
    let response = channel.query(command).await?;
    let (start, stop) = split_pair(command, &response)?;
    Ok((
        parse_number(command, &response, start)?,
        parse_number(command, &response, stop)?,
    ))
}

/// Check a frequency window before anything is written.
pub(crate) fn validate_frequency_range(start: f64, stop: f64) -> AppResult<()> {
    if !start.is_finite() || !stop.is_finite() || start < 0.0 || start >= stop {
        return Err(PnaError::Validation(format!(
            "Invalid frequency range [{}, {}] Hz",
            start, stop
        )));
    }
    Ok(())
}

/// `SENS:FREQ:STAR s; STOP p`
pub(crate) fn frequency_range_command(start: f64, stop: f64) -> String {
    format!("SENS:FREQ:STAR {}; STOP {}", start, stop)
}

/// Attenuation selection plus `SOUR:POW:ATT a; STAR s; STOP p`.
pub(crate) fn power_range_command(start: f64, stop: f64) -> AppResult<String> {
    let attenuation = select_attenuation(start, stop)?;
    Ok(format!(
        "SOUR:POW:ATT {}; STAR {}; STOP {}",
        attenuation, start, stop
    ))
}

/// `n` evenly spaced values with exact endpoints.
pub fn linear_axis(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let last = (n - 1) as f64;
            let mut axis: Vec<f64> = (0..n)
                .map(|i| start + (stop - start) * (i as f64 / last))
                .collect();
            axis[n - 1] = stop;
            axis
        }
    }
}

/// `n` values evenly spaced in log10, with exact endpoints.
///
/// Returns `None` unless both bounds are positive.
pub fn log_axis(start: f64, stop: f64, n: usize) -> Option<Vec<f64>> {
    if !(start > 0.0 && stop > 0.0) {
        return None;
    }
    let mut axis: Vec<f64> = linear_axis(start.log10(), stop.log10(), n)
        .into_iter()
        .map(|exponent| 10f64.powf(exponent))
        .collect();
    if let Some(first) = axis.first_mut() {
        *first = start;
    }
    if n > 1 {
        axis[n - 1] = stop;
    }
    Some(axis)
}

fn split_pair<'r>(command: &str, response: &'r str) -> AppResult<(&'r str, &'r str)> {
    let mut parts = response.split(';').map(str::trim);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(first), Some(second), None) => Ok((first, second)),
        _ => Err(PnaError::response(command, response)),
    }
}

fn parse_number<T: FromStr>(command: &str, response: &str, field: &str) -> AppResult<T> {
    field
        .trim()
        .parse()
        .map_err(|_| PnaError::response(command, response))
}

/// Parse a single numeric query response.
pub(crate) fn parse_response<T: FromStr>(command: &str, response: &str) -> AppResult<T> {
    parse_number(command, response, response)
}
