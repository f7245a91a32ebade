//! Simulated network analyzer.
//!
//! `MockPna` implements [`DeviceChannel`] and understands the subset of the
//! analyzer command set this crate uses. It provides:
//! - SCPI compound messages (`;` separated, relative header paths, `:` root reset)
//! - a parameter catalog with define / delete / select
//! - deterministic trace data returned as definite-length blocks
//! - an optional per-read size limit, to exercise chunked block reads
//! - one-shot failure injection and simulated latency
//! - an operation log for test verification
//!
//! Clones share state, so a test can hand one clone to a driver and keep
//! another for inspection.
//!
//! # Example
//!
//! ```
//! use pna_daq::adapters::DeviceChannel;
//! use pna_daq::hardware::pna::MockPna;
//!
//! # tokio_test::block_on(async {
//! let mut pna = MockPna::new();
//! pna.write("SENS:SWE:POIN 11").await.unwrap();
//! assert_eq!(pna.query("SENS:SWE:POIN?").await.unwrap(), "11");
//! # })
//! ```

use crate::adapters::DeviceChannel;
use crate::error::{AppResult, PnaError};
use crate::hardware::pna::block::{encode_block, interleave};
use crate::hardware::pna::measurement::MeasurementName;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use num_complex::Complex64;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// One recorded channel operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOp {
    /// `write(command)`
    Write(String),
    /// `query(command)`
    Query(String),
    /// `read(max_bytes)`
    Read(usize),
}

enum Reply {
    Text(String),
    Block(Bytes),
}

struct MockState {
    idn: String,
    catalog: Vec<(String, String)>,
    selected: Option<String>,
    data_format: String,
    trace_format: String,
    auto_sweep_time: bool,
    sweep_time: f64,
    points: usize,
    sweep_type: String,
    sweep_mode: String,
    group_count: u32,
    averages: u32,
    averaging: bool,
    bandwidth: f64,
    freq_start: f64,
    freq_stop: f64,
    cw_frequency: f64,
    power: f64,
    power_start: f64,
    power_stop: f64,
    attenuation: f64,
    electrical_delay: f64,
    phase_offset: f64,
    source_phase: f64,
    output: bool,
    continuous: bool,
    block_points: Option<usize>,
    raw_catalog: Option<String>,
    pending: BytesMut,
    max_read_chunk: Option<usize>,
    fail_next: Option<String>,
    log: Vec<ChannelOp>,
    unbounded: Vec<String>,
    opc_count: usize,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            idn: "Keysight Technologies,N5242A,MY00000000,A.12.00.00".to_string(),
            catalog: Vec::new(),
            selected: None,
            data_format: "ASC,0".to_string(),
            trace_format: "MLOG".to_string(),
            auto_sweep_time: true,
            sweep_time: 0.5,
            points: 201,
            sweep_type: "LIN".to_string(),
            sweep_mode: "CONT".to_string(),
            group_count: 1,
            averages: 1,
            averaging: false,
            bandwidth: 1000.0,
            freq_start: 1e9,
            freq_stop: 2e9,
            cw_frequency: 1e9,
            power: -10.0,
            power_start: -20.0,
            power_stop: 0.0,
            attenuation: 0.0,
            electrical_delay: 0.0,
            phase_offset: 0.0,
            source_phase: 0.0,
            output: false,
            continuous: true,
            block_points: None,
            raw_catalog: None,
            pending: BytesMut::new(),
            max_read_chunk: None,
            fail_next: None,
            log: Vec::new(),
            unbounded: Vec::new(),
            opc_count: 0,
        }
    }
}

/// In-process analyzer simulation.
#[derive(Clone, Default)]
pub struct MockPna {
    state: Arc<Mutex<MockState>>,
    latency: Option<Duration>,
}

impl MockPna {
    /// Analyzer with factory-like defaults: 201 points, 0.5 s sweeps,
    /// 1-2 GHz, empty catalog, output off.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before every channel operation.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Return at most `max` bytes per read, however many are asked for.
    pub fn with_max_read_chunk(self, max: usize) -> Self {
        self.state.lock().max_read_chunk = Some(max.max(1));
        self
    }

    /// Preload the parameter catalog with (name, measurement) pairs.
    pub fn with_catalog(self, entries: &[(&str, &str)]) -> Self {
        self.state.lock().catalog = entries
            .iter()
            .map(|(name, measurement)| (name.to_string(), measurement.to_string()))
            .collect();
        self
    }

    /// Set reported sweep time, point count and averaging count.
    pub fn with_sweep_timing(self, seconds: f64, points: usize, averages: u32) -> Self {
        {
            let mut state = self.state.lock();
            state.sweep_time = seconds;
            state.points = points;
            state.averages = averages;
        }
        self
    }

    /// Set the frequency window.
    pub fn with_frequency_range(self, start: f64, stop: f64) -> Self {
        {
            let mut state = self.state.lock();
            state.freq_start = start;
            state.freq_stop = stop;
        }
        self
    }

    /// Emit trace blocks with `points` samples regardless of the point count.
    pub fn with_block_points(self, points: usize) -> Self {
        self.state.lock().block_points = Some(points);
        self
    }

    /// Answer `CALC:PAR:CAT?` with `response` verbatim.
    pub fn with_raw_catalog(self, response: &str) -> Self {
        self.state.lock().raw_catalog = Some(response.to_string());
        self
    }

    /// Fail the next write or query whose command starts with `prefix`.
    pub fn inject_failure(&self, prefix: &str) {
        self.state.lock().fail_next = Some(prefix.to_ascii_uppercase());
    }

    /// Append raw bytes to the read buffer.
    pub fn queue_raw(&self, bytes: &[u8]) {
        self.state.lock().pending.extend_from_slice(bytes);
    }

    /// Every operation seen so far.
    pub fn operations(&self) -> Vec<ChannelOp> {
        self.state.lock().log.clone()
    }

    /// Commands passed to `write`, in order.
    pub fn writes(&self) -> Vec<String> {
        self.state
            .lock()
            .log
            .iter()
            .filter_map(|op| match op {
                ChannelOp::Write(command) => Some(command.clone()),
                _ => None,
            })
            .collect()
    }

    /// Commands passed to `query`, in order.
    pub fn queries(&self) -> Vec<String> {
        self.state
            .lock()
            .log
            .iter()
            .filter_map(|op| match op {
                ChannelOp::Query(command) => Some(command.clone()),
                _ => None,
            })
            .collect()
    }

    /// Commands issued through `query_unbounded`, in order.
    pub fn unbounded_queries(&self) -> Vec<String> {
        self.state.lock().unbounded.clone()
    }

    /// Forget recorded operations.
    pub fn clear_log(&self) {
        let mut state = self.state.lock();
        state.log.clear();
        state.unbounded.clear();
        state.opc_count = 0;
    }

    /// Number of `*OPC?` queries answered.
    pub fn opc_count(&self) -> usize {
        self.state.lock().opc_count
    }

    /// Current catalog as (name, measurement) pairs.
    pub fn catalog(&self) -> Vec<(String, String)> {
        self.state.lock().catalog.clone()
    }

    /// Whether the source output is on.
    pub fn output_enabled(&self) -> bool {
        self.state.lock().output
    }

    /// Current `SENS:SWE:TYPE` token.
    pub fn sweep_type(&self) -> String {
        self.state.lock().sweep_type.clone()
    }

    /// Current `FORM:DATA` setting.
    pub fn data_format(&self) -> String {
        self.state.lock().data_format.clone()
    }

    /// Bytes waiting to be read.
    pub fn pending_bytes(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Deterministic S-parameter value the simulation reports.
    pub fn trace_sample(measurement: MeasurementName, point: usize) -> Complex64 {
        let index = MeasurementName::ALL
            .iter()
            .position(|m| *m == measurement)
            .unwrap_or(0) as f64;
        Complex64::from_polar(0.2 * (index + 1.0), 0.01 * point as f64 + index)
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl MockState {
    fn take_failure(&mut self, command: &str) -> AppResult<()> {
        let matches = self
            .fail_next
            .as_deref()
            .is_some_and(|prefix| command.trim().to_ascii_uppercase().starts_with(prefix));
        if matches {
            self.fail_next = None;
            return Err(PnaError::Channel(format!(
                "Injected failure on '{}'",
                command
            )));
        }
        Ok(())
    }

    fn execute(&mut self, message: &str) -> AppResult<Vec<Reply>> {
        let mut replies = Vec::new();
        for command in expand_compound(message) {
            let (header, args) = split_command(&command);
            if let Some(reply) = self.execute_one(&header, args)? {
                replies.push(reply);
            }
        }
        Ok(replies)
    }

    fn execute_one(&mut self, header: &str, args: &str) -> AppResult<Option<Reply>> {
        let text = |value: String| -> AppResult<Option<Reply>> { Ok(Some(Reply::Text(value))) };

        match header {
            "*IDN?" => text(self.idn.clone()),
            "*OPC?" => {
                self.opc_count += 1;
                text("1".to_string())
            }
            "FORM:DATA" => {
                self.data_format = args.to_ascii_uppercase();
                Ok(None)
            }
            "FORM:DATA?" => text(self.data_format.clone()),

            "CALC:PAR:CAT?" => {
                if let Some(raw) = &self.raw_catalog {
                    return text(raw.clone());
                }
                let body = if self.catalog.is_empty() {
                    "NO CATALOG".to_string()
                } else {
                    self.catalog
                        .iter()
                        .flat_map(|(name, meas)| [name.as_str(), meas.as_str()])
                        .collect::<Vec<_>>()
                        .join(",")
                };
                text(format!("\"{}\"", body))
            }
            "CALC:PAR:DEF" => {
                let (name, meas) = args.split_once(',').unwrap_or((args, ""));
                let name = unquote(name);
                if self.catalog.iter().any(|(n, _)| *n == name) {
                    tracing::warn!(%name, "MockPna: parameter already defined");
                } else {
                    self.catalog.push((name, meas.trim().to_ascii_uppercase()));
                }
                Ok(None)
            }
            "CALC:PAR:DEL" => {
                let name = unquote(args);
                let before = self.catalog.len();
                self.catalog.retain(|(n, _)| *n != name);
                if self.catalog.len() == before {
                    tracing::warn!(%name, "MockPna: delete of undefined parameter");
                }
                if self.selected.as_deref() == Some(name.as_str()) {
                    self.selected = None;
                }
                Ok(None)
            }
            "CALC:PAR:SEL" => {
                let name = unquote(args);
                if !self.catalog.iter().any(|(n, _)| *n == name) {
                    return Err(PnaError::Channel(format!(
                        "Parameter '{}' not found",
                        name
                    )));
                }
                self.selected = Some(name);
                Ok(None)
            }
            "CALC:PAR:SEL?" => text(format!("\"{}\"", self.selected.clone().unwrap_or_default())),
            "CALC:FORM" => {
                self.trace_format = args.to_ascii_uppercase();
                Ok(None)
            }
            "CALC:FORM?" => text(self.trace_format.clone()),
            "CALC:DATA?" => self.trace_block(args).map(|block| Some(Reply::Block(block))),
            "CALC:CORR:EDEL:TIME" => {
                if let Some(seconds) = parse_delay(args) {
                    self.electrical_delay = seconds;
                }
                Ok(None)
            }
            "CALC:CORR:EDEL:TIME?" => text(self.electrical_delay.to_string()),
            "CALC:CORR:OFFS:PHAS" => set_f64(&mut self.phase_offset, args),
            "CALC:CORR:OFFS:PHAS?" => text(self.phase_offset.to_string()),

            "SENS:SWE:TIME:AUTO" => set_bool(&mut self.auto_sweep_time, args),
            "SENS:SWE:TIME:AUTO?" => text(bool_text(self.auto_sweep_time)),
            "SENS:SWE:TIME" => set_f64(&mut self.sweep_time, args),
            "SENS:SWE:TIME?" => text(self.sweep_time.to_string()),
            "SENS:SWE:POIN" => {
                match args.trim().parse::<usize>() {
                    Ok(points) if points > 0 => self.points = points,
                    _ => tracing::warn!(args, "MockPna: invalid point count"),
                }
                Ok(None)
            }
            "SENS:SWE:POIN?" => text(self.points.to_string()),
            "SENS:SWE:TYPE" => {
                self.sweep_type = args.trim().to_ascii_uppercase();
                Ok(None)
            }
            "SENS:SWE:TYPE?" => text(self.sweep_type.clone()),
            "SENS:SWE:MODE" => {
                self.sweep_mode = args.trim().to_ascii_uppercase();
                Ok(None)
            }
            "SENS:SWE:MODE?" => text(self.sweep_mode.clone()),
            "SENS:SWE:GRO:COUN" => set_u32(&mut self.group_count, args),
            "SENS:SWE:GRO:COUN?" => text(self.group_count.to_string()),
            "SENS:AVER:COUN" => set_u32(&mut self.averages, args),
            "SENS:AVER:COUN?" => text(self.averages.to_string()),
            "SENS:AVER" => set_bool(&mut self.averaging, args),
            "SENS:AVER?" => text(bool_text(self.averaging)),
            "SENS:BAND" => set_f64(&mut self.bandwidth, args),
            "SENS:BAND?" => text(self.bandwidth.to_string()),
            "SENS:FREQ:STAR" => set_f64(&mut self.freq_start, args),
            "SENS:FREQ:STAR?" => text(self.freq_start.to_string()),
            "SENS:FREQ:STOP" => set_f64(&mut self.freq_stop, args),
            "SENS:FREQ:STOP?" => text(self.freq_stop.to_string()),
            "SENS:FREQ:CW" => set_f64(&mut self.cw_frequency, args),
            "SENS:FREQ:CW?" => text(self.cw_frequency.to_string()),

            "SOUR:POW" => set_f64(&mut self.power, args),
            "SOUR:POW?" => text(self.power.to_string()),
            "SOUR:POW:STAR" => set_f64(&mut self.power_start, args),
            "SOUR:POW:STAR?" => text(self.power_start.to_string()),
            "SOUR:POW:STOP" => set_f64(&mut self.power_stop, args),
            "SOUR:POW:STOP?" => text(self.power_stop.to_string()),
            "SOUR:POW:ATT" => set_f64(&mut self.attenuation, args),
            "SOUR:POW:ATT?" => text(self.attenuation.to_string()),
            "SOUR:PHAS" => set_f64(&mut self.source_phase, args),
            "SOUR:PHAS?" => text(self.source_phase.to_string()),

            "OUTP" => set_bool(&mut self.output, args),
            "OUTP?" => text(bool_text(self.output)),
            "INIT:CONT" => set_bool(&mut self.continuous, args),
            "INIT:CONT?" => text(bool_text(self.continuous)),
            "ABOR" => Ok(None),

            other => {
                tracing::warn!(command = other, args, "MockPna: unknown command");
                Ok(None)
            }
        }
    }

    fn trace_block(&self, args: &str) -> AppResult<Bytes> {
        let name = self
            .selected
            .as_deref()
            .ok_or_else(|| PnaError::Channel("No parameter selected".to_string()))?;
        let measurement = self
            .catalog
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, meas)| meas.parse::<MeasurementName>().ok());

        let points = self.block_points.unwrap_or(self.points);
        let samples: Vec<Complex64> = (0..points)
            .map(|i| {
                measurement.map_or(Complex64::new(0.0, 0.0), |m| MockPna::trace_sample(m, i))
            })
            .collect();

        let values = match args.trim().to_ascii_uppercase().as_str() {
            "SDATA" => interleave(&samples),
            "FDATA" => match self.trace_format.as_str() {
                "PHAS" => samples.iter().map(|s| s.arg().to_degrees()).collect(),
                _ => samples.iter().map(|s| 20.0 * s.norm().log10()).collect(),
            },
            other => {
                return Err(PnaError::Channel(format!(
                    "Unsupported data type '{}'",
                    other
                )))
            }
        };
        Ok(encode_block(&values))
    }
}

#[async_trait]
impl DeviceChannel for MockPna {
    async fn write(&mut self, command: &str) -> AppResult<()> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.log.push(ChannelOp::Write(command.to_string()));
        state.take_failure(command)?;

        for reply in state.execute(command)? {
            match reply {
                Reply::Text(text) => {
                    state.pending.extend_from_slice(text.as_bytes());
                    state.pending.extend_from_slice(b"\n");
                }
                Reply::Block(block) => state.pending.extend_from_slice(&block),
            }
        }
        Ok(())
    }

    async fn query(&mut self, command: &str) -> AppResult<String> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.log.push(ChannelOp::Query(command.to_string()));
        state.take_failure(command)?;

        let mut texts = Vec::new();
        for reply in state.execute(command)? {
            match reply {
                Reply::Text(text) => texts.push(text),
                Reply::Block(block) => state.pending.extend_from_slice(&block),
            }
        }

        if texts.is_empty() {
            return Err(PnaError::Channel(format!(
                "Timeout waiting for response to '{}'",
                command
            )));
        }
        Ok(texts.join(";"))
    }

    async fn query_unbounded(&mut self, command: &str) -> AppResult<String> {
        self.state.lock().unbounded.push(command.to_string());
        self.query(command).await
    }

    async fn read(&mut self, max_bytes: usize) -> AppResult<Bytes> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.log.push(ChannelOp::Read(max_bytes));

        if state.pending.is_empty() {
            return Err(PnaError::Channel("Read timeout: no data pending".to_string()));
        }

        let limit = state.max_read_chunk.unwrap_or(usize::MAX);
        let n = max_bytes.min(limit).min(state.pending.len());
        Ok(state.pending.split_to(n).freeze())
    }

    fn describe(&self) -> String {
        "MockPna".to_string()
    }
}

/// Split a compound message into absolute commands.
///
/// A leading `:` resets to the root; otherwise a command inherits the header
/// path of the one before it, so `SENS:SWE:TIME?; POIN?` expands to
/// `SENS:SWE:TIME?` and `SENS:SWE:POIN?`.
fn expand_compound(message: &str) -> Vec<String> {
    let mut commands = Vec::new();
    let mut path = String::new();

    for part in message.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let command = if let Some(rooted) = part.strip_prefix(':') {
            rooted.to_string()
        } else if part.starts_with('*') {
            part.to_string()
        } else {
            format!("{}{}", path, part)
        };

        let header = command.split_whitespace().next().unwrap_or("");
        path = match header.rfind(':') {
            Some(idx) => header[..=idx].to_string(),
            None => String::new(),
        };
        commands.push(command);
    }
    commands
}

/// Normalised upper-case header and the raw argument text.
fn split_command(command: &str) -> (String, &str) {
    let (header, args) = command
        .split_once(char::is_whitespace)
        .unwrap_or((command, ""));
    let mut header = header.to_ascii_uppercase();
    if header == "ABORT" {
        header = "ABOR".to_string();
    }
    (header, args.trim())
}

fn unquote(text: &str) -> String {
    text.trim().trim_matches(|c| c == '\'' || c == '"').to_string()
}

fn bool_text(value: bool) -> String {
    let text = if value { "1" } else { "0" };
    text.to_string()
}

fn set_f64(slot: &mut f64, args: &str) -> AppResult<Option<Reply>> {
    match args.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => *slot = value,
        _ => tracing::warn!(args, "MockPna: invalid numeric argument"),
    }
    Ok(None)
}

fn set_u32(slot: &mut u32, args: &str) -> AppResult<Option<Reply>> {
    match args.trim().parse::<u32>() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!(args, "MockPna: invalid integer argument"),
    }
    Ok(None)
}

fn set_bool(slot: &mut bool, args: &str) -> AppResult<Option<Reply>> {
    match args.trim().to_ascii_uppercase().as_str() {
        "1" | "ON" => *slot = true,
        "0" | "OFF" => *slot = false,
        _ => tracing::warn!(args, "MockPna: invalid boolean argument"),
    }
    Ok(None)
}

/// Delay in seconds; a trailing `NS` means nanoseconds.
fn parse_delay(args: &str) -> Option<f64> {
    let upper = args.trim().to_ascii_uppercase();
    match upper.strip_suffix("NS") {
        Some(ns) => ns.trim().parse::<f64>().ok().map(|v| v * 1e-9),
        None => upper.parse::<f64>().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compound_expansion() {
        assert_eq!(
            expand_compound("SENS:SWE:TIME?; POIN?"),
            vec!["SENS:SWE:TIME?", "SENS:SWE:POIN?"]
        );
        assert_eq!(
            expand_compound("SENS:SWE:TIME:AUTO ON; :INIT:CONT ON; :OUTP ON"),
            vec!["SENS:SWE:TIME:AUTO ON", "INIT:CONT ON", "OUTP ON"]
        );
        assert_eq!(
            expand_compound("SOUR:POW:ATT 10; STAR -35; STOP 5"),
            vec!["SOUR:POW:ATT 10", "SOUR:POW:STAR -35", "SOUR:POW:STOP 5"]
        );
        assert_eq!(
            expand_compound("ABORT;SENS:SWE:MODE GRO"),
            vec!["ABORT", "SENS:SWE:MODE GRO"]
        );
    }

    #[tokio::test]
    async fn test_compound_query_joins_replies() {
        let mut pna = MockPna::new().with_sweep_timing(2.0, 101, 4);
        assert_eq!(pna.query("SENS:SWE:TIME?; POIN?").await.unwrap(), "2;101");
        assert_eq!(pna.query("SENS:FREQ:STAR?; STOP?").await.unwrap(), "1000000000;2000000000");
    }

    #[tokio::test]
    async fn test_catalog_define_delete() {
        let mut pna = MockPna::new();
        assert_eq!(pna.query("CALC:PAR:CAT?").await.unwrap(), "\"NO CATALOG\"");

        pna.write("CALC:PAR:DEF 'daq_S21',S21").await.unwrap();
        pna.write("CALC:PAR:DEF 'daq_S11',S11").await.unwrap();
        assert_eq!(
            pna.query("CALC:PAR:CAT?").await.unwrap(),
            "\"daq_S21,S21,daq_S11,S11\""
        );

        pna.write("CALC:PAR:DEL 'daq_S21'").await.unwrap();
        assert_eq!(pna.catalog(), vec![("daq_S11".to_string(), "S11".to_string())]);
    }

    #[tokio::test]
    async fn test_select_undefined_fails() {
        let mut pna = MockPna::new();
        let err = pna.write("CALC:PAR:SEL 'missing'").await.unwrap_err();
        assert!(matches!(err, PnaError::Channel(_)));
    }

    #[tokio::test]
    async fn test_data_block_respects_read_limit() {
        let mut pna = MockPna::new()
            .with_catalog(&[("daq_S21", "S21")])
            .with_max_read_chunk(5);
        pna.write("SENS:SWE:POIN 3").await.unwrap();
        pna.write("CALC:PAR:SEL 'daq_S21'").await.unwrap();
        pna.write("CALC:DATA? SDATA").await.unwrap();

        // "#" "2" "48" + 48 bytes + "\n"
        assert_eq!(pna.pending_bytes(), 53);
        let first = pna.read(100).await.unwrap();
        assert_eq!(first.len(), 5);
        assert_eq!(&first[..4], b"#248");
    }

    #[tokio::test]
    async fn test_read_with_nothing_pending_fails() {
        let mut pna = MockPna::new();
        assert!(matches!(pna.read(10).await, Err(PnaError::Channel(_))));
    }

    #[tokio::test]
    async fn test_injected_failure_is_one_shot() {
        let mut pna = MockPna::new();
        pna.inject_failure("OUTP");
        assert!(pna.write("OUTP ON").await.is_err());
        assert!(pna.write("OUTP ON").await.is_ok());
        assert!(pna.output_enabled());
    }

    #[tokio::test]
    async fn test_electrical_delay_units() {
        let mut pna = MockPna::new();
        pna.write("CALC:CORR:EDEL:TIME 2.5NS").await.unwrap();
        let seconds: f64 = pna.query("CALC:CORR:EDEL:TIME?").await.unwrap().parse().unwrap();
        assert!((seconds - 2.5e-9).abs() < 1e-18);
    }

    #[tokio::test]
    async fn test_unknown_command_is_ignored() {
        let mut pna = MockPna::new();
        assert!(pna.write("DISP:WIND:TRAC:FEED 'x'").await.is_ok());
        assert!(pna.query("DISP:ENAB?").await.is_err());
    }
}
