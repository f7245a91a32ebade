//! CLI Entry Point for pna_daq
//!
//! Provides command-line access to a network analyzer:
//! - Identify the instrument
//! - Synchronize the measurement catalog
//! - Run sweeps and save the flattened result
//! - Read the current trace without sweeping
//!
//! The transport (raw TCP socket or the simulated analyzer) comes from the
//! configuration file and `PNA_DAQ_` environment variables.
//!
//! # Usage
//!
//! ```bash
//! pna_daq identify
//! pna_daq measurements S21 S11
//! pna_daq sweep --kind linear --meas S21 --start 1e9 --stop 2e9 --output cavity
//! pna_daq trace S21
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pna_daq::config::PnaConfig;
use pna_daq::data::ResultTable;
use pna_daq::hardware::pna::{MeasurementName, MeasurementSet, SweepSpec, SweepType, TraceData};
use pna_daq::{logging, PnaDriver};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pna_daq")]
#[command(about = "Network analyzer sweep acquisition", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the instrument identification string
    Identify,

    /// Define exactly these measurements on the instrument
    Measurements {
        /// Measurement names, e.g. S21 S11
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Run a sweep
    Sweep {
        /// Sweep type: linear, log, power or cw
        #[arg(long, default_value = "linear")]
        kind: String,

        /// Measurements to fetch
        #[arg(long = "meas", default_values_t = vec!["S21".to_string()])]
        measurements: Vec<String>,

        /// Fetch phase-formatted data instead of S-parameters
        #[arg(long)]
        phase: bool,

        /// Axis start (Hz, or dBm for power sweeps)
        #[arg(long, requires = "stop", allow_hyphen_values = true)]
        start: Option<f64>,

        /// Axis stop (Hz, or dBm for power sweeps)
        #[arg(long, requires = "start", allow_hyphen_values = true)]
        stop: Option<f64>,

        /// Save as CSV under the configured output directory with this name
        #[arg(long)]
        output: Option<String>,
    },

    /// Read the current trace of one measurement without sweeping
    Trace {
        /// Measurement name
        measurement: String,
    },

    /// Print the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => PnaConfig::load_from(path),
        None => PnaConfig::load(),
    }
    .context("Failed to load configuration")?;
    config.validate()?;

    logging::init_from_config(&config)?;

    if let Commands::ShowConfig = cli.command {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let driver = PnaDriver::from_config(&config)
        .await
        .context("Failed to open instrument")?;

    match cli.command {
        Commands::Identify => {
            println!("{}", driver.identify().await?);
        }
        Commands::Measurements { names } => {
            let active = driver
                .synchronize_measurements(&MeasurementSet::from_names(&names))
                .await?;
            let listed: Vec<String> = active.iter().map(|m| m.to_string()).collect();
            println!("Active measurements: {}", listed.join(", "));
        }
        Commands::Sweep {
            kind,
            measurements,
            phase,
            start,
            stop,
            output,
        } => {
            let sweep_type: SweepType = kind.parse()?;
            let set = MeasurementSet::from_names(&measurements);
            driver.synchronize_measurements(&set).await?;

            let mut spec = SweepSpec::new(sweep_type, set);
            if phase {
                spec = spec.with_data(TraceData::Phase);
            }
            if let (Some(start), Some(stop)) = (start, stop) {
                spec = spec.with_range(start, stop);
            }

            let table = driver.sweep_table(&spec).await?;
            match output {
                Some(name) => save(&config, &name, &table)?,
                None => print_table(&table),
            }
        }
        Commands::Trace { measurement } => {
            let measurement: MeasurementName = measurement.parse()?;
            let result = driver.fetch_trace(measurement).await?;
            print_table(&result.to_table());
        }
        Commands::ShowConfig => {}
    }

    Ok(())
}

fn print_table(table: &ResultTable) {
    println!("{}", table.columns.join(","));
    for row in &table.rows {
        let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        println!("{}", cells.join(","));
    }
}

#[cfg(feature = "storage_csv")]
fn save(config: &PnaConfig, name: &str, table: &ResultTable) -> Result<()> {
    let writer = pna_daq::data::CsvWriter::new(&config.storage.output_dir);
    let path = writer.write(name, table)?;
    println!("Saved {} rows to {}", table.rows.len(), path.display());
    Ok(())
}

#[cfg(not(feature = "storage_csv"))]
fn save(_config: &PnaConfig, _name: &str, _table: &ResultTable) -> Result<()> {
    anyhow::bail!("CSV output requires the 'storage_csv' feature")
}
