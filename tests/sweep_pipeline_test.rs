//! End-to-end sweeps against the simulated analyzer.
//!
//! Timed waits run on tokio's paused clock, so a 12 second acquisition
//! finishes instantly while still advancing virtual time.

use pna_daq::hardware::pna::mock::ChannelOp;
use pna_daq::hardware::pna::{
    MeasurementName, MeasurementSet, MockPna, PnaDriver, PnaSettings, SampleBlock, SweepSpec,
    SweepType, TraceData,
};
use pna_daq::PnaError;
use std::time::Duration;
use tokio::time::Instant;

const ARM: &str = "SENS:SWE:TIME:AUTO ON; :INIT:CONT ON; :OUTP ON";

async fn ready_driver(mock: &MockPna, names: &[&str]) -> (PnaDriver, MeasurementSet) {
    let driver = PnaDriver::new(mock.clone(), PnaSettings::default());
    let set = MeasurementSet::from_names(names);
    driver.synchronize_measurements(&set).await.unwrap();
    mock.clear_log();
    (driver, set)
}

// =============================================================================
// Happy path
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_short_linear_sweep_polls_immediately() {
    let mock = MockPna::new()
        .with_sweep_timing(0.5, 201, 1)
        .with_frequency_range(1e9, 2e9);
    let (driver, set) = ready_driver(&mock, &["S21"]).await;

    let started = Instant::now();
    let result = driver
        .sweep(&SweepSpec::new(SweepType::Linear, set))
        .await
        .unwrap();

    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(mock.opc_count(), 1);

    assert_eq!(result.axis.len(), 201);
    assert_eq!(result.axis[0], 1e9);
    assert_eq!(result.axis[200], 2e9);
    let step = result.axis[1] - result.axis[0];
    assert!((step - 5e6).abs() < 1e-3);

    let samples = result.get(MeasurementName::S21).unwrap().as_complex().unwrap();
    assert_eq!(samples.len(), 201);
    assert_eq!(samples[42], MockPna::trace_sample(MeasurementName::S21, 42));
}

#[tokio::test]
async fn test_sweep_command_sequence() {
    let mock = MockPna::new();
    let (driver, set) = ready_driver(&mock, &["S21"]).await;

    driver
        .sweep(&SweepSpec::new(SweepType::Linear, set))
        .await
        .unwrap();

    assert_eq!(
        mock.queries(),
        vec![
            "SENS:FREQ:STAR?; STOP?",
            "SENS:SWE:TIME?; POIN?",
            "SENS:AVER:COUN?",
            "*OPC?",
        ]
    );
    assert_eq!(
        mock.writes(),
        vec![
            ARM,
            "SENS:SWE:TYPE LIN",
            "ABORT;SENS:SWE:MODE GRO",
            "CALC:PAR:SEL 'daq_S21'",
            "CALC:DATA? SDATA",
            "OUTP OFF",
        ]
    );
    // Completion is awaited without the channel's I/O timeout.
    assert_eq!(mock.unbounded_queries(), vec!["*OPC?"]);
    assert!(!mock.output_enabled());
    assert_eq!(mock.pending_bytes(), 0);
}

#[tokio::test]
async fn test_results_follow_caller_order() {
    let mock = MockPna::new().with_sweep_timing(0.1, 11, 1);
    let (driver, set) = ready_driver(&mock, &["S22", "S11", "S21"]).await;

    let result = driver
        .sweep(&SweepSpec::new(SweepType::Linear, set))
        .await
        .unwrap();

    let order: Vec<_> = result.measurements.iter().map(|(m, _)| *m).collect();
    assert_eq!(
        order,
        vec![MeasurementName::S22, MeasurementName::S11, MeasurementName::S21]
    );
}

#[tokio::test]
async fn test_log_sweep_axis_is_geometric() {
    let mock = MockPna::new()
        .with_sweep_timing(0.2, 4, 1)
        .with_frequency_range(1e6, 1e9);
    let (driver, set) = ready_driver(&mock, &["S21"]).await;

    let result = driver
        .sweep(&SweepSpec::new(SweepType::Logarithmic, set))
        .await
        .unwrap();

    assert_eq!(mock.sweep_type(), "LOG");
    assert_eq!(result.axis[0], 1e6);
    assert_eq!(result.axis[3], 1e9);
    assert!((result.axis[1] / 1e7 - 1.0).abs() < 1e-12);
}

#[tokio::test]
async fn test_phase_sweep_decodes_real_samples() {
    let mock = MockPna::new().with_sweep_timing(0.1, 21, 1);
    let (driver, set) = ready_driver(&mock, &["S21"]).await;

    let spec = SweepSpec::new(SweepType::Linear, set).with_data(TraceData::Phase);
    let result = driver.sweep(&spec).await.unwrap();

    let phases = result.get(MeasurementName::S21).unwrap().as_real().unwrap();
    let expected = MockPna::trace_sample(MeasurementName::S21, 3).arg().to_degrees();
    assert_eq!(phases[3], expected);

    let writes = mock.writes();
    let select = writes.iter().position(|w| w == "CALC:PAR:SEL 'daq_S21'").unwrap();
    assert_eq!(writes[select + 1], "CALC:FORM PHAS");
    assert_eq!(writes[select + 2], "CALC:DATA? FDATA");
}

#[tokio::test]
async fn test_power_sweep_applies_range_with_attenuation() {
    let mock = MockPna::new().with_sweep_timing(0.1, 6, 1);
    let (driver, set) = ready_driver(&mock, &["S21"]).await;

    let spec = SweepSpec::new(SweepType::Power, set).with_range(-35.0, 5.0);
    let result = driver.sweep(&spec).await.unwrap();

    assert_eq!(mock.writes()[0], "SOUR:POW:ATT 10; STAR -35; STOP 5");
    assert_eq!(mock.queries()[0], "SOUR:POW:STAR?; STOP?");
    let expected = [-35.0, -27.0, -19.0, -11.0, -3.0, 5.0];
    assert_eq!(result.axis.len(), expected.len());
    for (got, want) in result.axis.iter().zip(expected) {
        assert!((got - want).abs() < 1e-9, "{} != {}", got, want);
    }
    assert_eq!(mock.sweep_type(), "POW");
}

#[tokio::test]
async fn test_cw_sweep_axis_is_acquisition_index() {
    let mock = MockPna::new().with_sweep_timing(0.1, 5, 1);
    let (driver, set) = ready_driver(&mock, &["S21"]).await;

    let result = driver
        .sweep(&SweepSpec::new(SweepType::ContinuousWave, set))
        .await
        .unwrap();

    assert_eq!(result.axis, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    assert!(!mock
        .queries()
        .iter()
        .any(|q| q.contains("STAR?")));
}

#[tokio::test]
async fn test_chunked_reads_give_identical_results() {
    let whole = MockPna::new();
    let (driver, set) = ready_driver(&whole, &["S21", "S12"]).await;
    let reference = driver
        .sweep(&SweepSpec::new(SweepType::Linear, set.clone()))
        .await
        .unwrap();

    let limited = MockPna::new().with_max_read_chunk(97);
    let (driver, _) = ready_driver(&limited, &["S21", "S12"]).await;
    let split = driver
        .sweep(&SweepSpec::new(SweepType::Linear, set))
        .await
        .unwrap();

    assert_eq!(split, reference);
    let reads = limited
        .operations()
        .iter()
        .filter(|op| matches!(op, ChannelOp::Read(_)))
        .count();
    assert!(reads > 60, "expected many short reads, got {}", reads);
}

// =============================================================================
// Timed wait
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_long_sweep_waits_total_time_times_port_factor() {
    // 2 s per sweep, 3 averages, two source ports: 12 s.
    let mock = MockPna::new().with_sweep_timing(2.0, 11, 3);
    let (driver, set) = ready_driver(&mock, &["S21", "S12"]).await;
    assert_eq!(set.port_factor(), 2);

    let started = Instant::now();
    driver
        .sweep(&SweepSpec::new(SweepType::Linear, set))
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(12), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(12_100), "{:?}", elapsed);
    assert_eq!(mock.opc_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_same_port_measurements_do_not_scale_wait() {
    let mock = MockPna::new().with_sweep_timing(1.5, 11, 2);
    let (driver, set) = ready_driver(&mock, &["S21", "S11"]).await;

    let started = Instant::now();
    driver
        .sweep(&SweepSpec::new(SweepType::Linear, set))
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(3));
    assert!(elapsed < Duration::from_millis(3_100));
}

// =============================================================================
// Sequencing
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_concurrent_sweeps_on_one_device_do_not_interleave() {
    let mock = MockPna::new()
        .with_sweep_timing(2.0, 11, 1)
        .with_latency(Duration::from_millis(1));
    let (driver, set) = ready_driver(&mock, &["S21"]).await;

    let started = Instant::now();
    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let driver = driver.clone();
            let spec = SweepSpec::new(SweepType::Linear, set.clone());
            tokio::spawn(async move { driver.sweep(&spec).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert!(started.elapsed() >= Duration::from_secs(4));

    let writes = mock.writes();
    let arms: Vec<usize> = positions(&writes, ARM);
    let offs: Vec<usize> = positions(&writes, "OUTP OFF");
    assert_eq!(arms.len(), 2);
    assert_eq!(offs.len(), 2);
    assert!(arms[0] < offs[0] && offs[0] < arms[1] && arms[1] < offs[1]);
}

#[tokio::test(start_paused = true)]
async fn test_separate_devices_sweep_in_parallel() {
    let first = MockPna::new().with_sweep_timing(2.0, 11, 1);
    let second = MockPna::new().with_sweep_timing(2.0, 11, 1);
    let (a, set_a) = ready_driver(&first, &["S21"]).await;
    let (b, set_b) = ready_driver(&second, &["S21"]).await;

    let started = Instant::now();
    let spec_a = SweepSpec::new(SweepType::Linear, set_a);
    let spec_b = SweepSpec::new(SweepType::Linear, set_b);
    let (ra, rb) = tokio::join!(a.sweep(&spec_a), b.sweep(&spec_b));
    ra.unwrap();
    rb.unwrap();

    assert!(started.elapsed() < Duration::from_secs(3));
}

fn positions(writes: &[String], command: &str) -> Vec<usize> {
    writes
        .iter()
        .enumerate()
        .filter(|(_, w)| w.as_str() == command)
        .map(|(i, _)| i)
        .collect()
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_unreachable_power_window_fails_before_any_write() {
    let mock = MockPna::new();
    let (driver, set) = ready_driver(&mock, &["S21"]).await;

    let spec = SweepSpec::new(SweepType::Power, set).with_range(-50.0, 5.0);
    let err = driver.sweep(&spec).await.unwrap_err();

    assert!(matches!(err, PnaError::Range(_)));
    assert!(err.is_bad_input());
    assert!(mock.operations().is_empty());
}

#[tokio::test]
async fn test_invalid_frequency_window_fails_before_any_write() {
    let mock = MockPna::new();
    let (driver, set) = ready_driver(&mock, &["S21"]).await;

    let spec = SweepSpec::new(SweepType::Linear, set).with_range(2e9, 1e9);
    assert!(matches!(
        driver.sweep(&spec).await,
        Err(PnaError::Validation(_))
    ));
    assert!(mock.operations().is_empty());
}

#[tokio::test]
async fn test_fetch_failure_turns_output_off() {
    let mock = MockPna::new();
    let (driver, set) = ready_driver(&mock, &["S21"]).await;
    mock.inject_failure("CALC:DATA?");

    let err = driver
        .sweep(&SweepSpec::new(SweepType::Linear, set))
        .await
        .unwrap_err();

    assert!(matches!(err, PnaError::Channel(_)));
    assert!(!err.is_bad_input());
    assert_eq!(mock.writes().last().map(String::as_str), Some("OUTP OFF"));
    assert!(!mock.output_enabled());
}

#[tokio::test]
async fn test_short_block_is_framing_error_and_output_off() {
    let mock = MockPna::new().with_block_points(10);
    let (driver, set) = ready_driver(&mock, &["S21"]).await;

    let err = driver
        .sweep(&SweepSpec::new(SweepType::Linear, set))
        .await
        .unwrap_err();

    assert!(matches!(err, PnaError::Framing(_)));
    assert!(!mock.output_enabled());
}

#[tokio::test]
async fn test_undefined_measurement_fails_the_sweep() {
    let mock = MockPna::new();
    let driver = PnaDriver::new(mock.clone(), PnaSettings::default());

    let spec = SweepSpec::new(SweepType::Linear, MeasurementSet::from_names(["S11"]));
    let err = driver.sweep(&spec).await.unwrap_err();

    assert!(matches!(err, PnaError::Channel(_)));
    assert!(!mock.output_enabled());
}

#[tokio::test]
async fn test_failure_before_output_on_leaves_output_untouched() {
    let mock = MockPna::new();
    let (driver, set) = ready_driver(&mock, &["S21"]).await;
    mock.inject_failure("SENS:FREQ:STAR?");

    driver
        .sweep(&SweepSpec::new(SweepType::Linear, set))
        .await
        .unwrap_err();
    assert!(mock.writes().is_empty());
}

// =============================================================================
// Tables
// =============================================================================

#[tokio::test]
async fn test_sweep_table_records_settings() {
    let mock = MockPna::new().with_sweep_timing(0.1, 3, 1);
    let (driver, set) = ready_driver(&mock, &["S21"]).await;
    driver.power(Some(-15.0)).await.unwrap();
    driver.bandwidth(Some(100.0)).await.unwrap();

    let table = driver
        .sweep_table(&SweepSpec::new(SweepType::Linear, set))
        .await
        .unwrap();

    assert_eq!(table.columns.len(), 3);
    assert_eq!(table.rows.len(), 3);
    assert_eq!(table.metadata.parameters["power [dBm]"], -15.0);
    assert_eq!(table.metadata.parameters["bandwidth [Hz]"], 100.0);
}

#[tokio::test]
async fn test_table_metadata_matches_the_acquisition() {
    let mock = MockPna::new().with_sweep_timing(0.1, 3, 1);
    let (driver, set) = ready_driver(&mock, &["S21"]).await;
    driver.power(Some(-15.0)).await.unwrap();
    mock.clear_log();

    // The setter queues behind the table conversation and cannot land
    // between the sweep and its metadata.
    let spec = SweepSpec::new(SweepType::Linear, set);
    let (table, power) = tokio::join!(driver.sweep_table(&spec), driver.power(Some(5.0)));
    let table = table.unwrap();
    power.unwrap();

    assert_eq!(table.metadata.parameters["power [dBm]"], -15.0);
    let ops = mock.operations();
    let metadata_read = ops
        .iter()
        .position(|op| *op == ChannelOp::Query("SENS:BAND?".to_string()))
        .unwrap();
    let setter = ops
        .iter()
        .position(|op| *op == ChannelOp::Write("SOUR:POW 5".to_string()))
        .unwrap();
    assert!(setter > metadata_read);
}

#[tokio::test]
async fn test_power_sweep_table_records_cw_frequency() {
    let mock = MockPna::new().with_sweep_timing(0.1, 3, 1);
    let (driver, set) = ready_driver(&mock, &["S21"]).await;
    driver.cw_frequency(Some(6.5e9)).await.unwrap();

    let table = driver
        .sweep_table(&SweepSpec::new(SweepType::Power, set))
        .await
        .unwrap();

    assert_eq!(table.columns[0], "power [dBm]");
    assert_eq!(table.metadata.parameters["frequency [Hz]"], 6.5e9);
    assert!(!table.metadata.parameters.contains_key("power [dBm]"));
    assert!(matches!(
        driver.fetch_trace(MeasurementName::S21).await.unwrap().measurements[0].1,
        SampleBlock::Complex(_)
    ));
}
