//! Flattened sweep results and their storage.
//!
//! A [`ResultTable`] is the row-oriented form of a [`SweepResult`]: the axis
//! in the first column, then the log magnitude of every complex measurement,
//! then the phase of every measurement. It carries enough metadata (axis
//! quantity, sweep type, acquisition time and instrument settings) to be
//! written out on its own.

pub mod storage;

#[cfg(feature = "storage_csv")]
pub use storage::CsvWriter;

use crate::hardware::pna::{SampleBlock, SweepResult, SweepType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Descriptive data stored alongside a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    /// Label of the independent column
    pub independent: String,
    /// Sweep mode that produced the data
    pub sweep_type: SweepType,
    /// Instrument settings in effect, keyed by name with unit
    pub parameters: BTreeMap<String, f64>,
    /// When the table was built
    pub acquired_at: DateTime<Utc>,
}

impl TableMetadata {
    /// Record one named setting.
    pub fn insert_parameter(&mut self, name: impl Into<String>, value: f64) {
        self.parameters.insert(name.into(), value);
    }
}

/// Row-oriented sweep data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    /// Column labels
    pub columns: Vec<String>,
    /// One row per sweep point
    pub rows: Vec<Vec<f64>>,
    /// Descriptive data
    pub metadata: TableMetadata,
}

impl ResultTable {
    /// Flatten a sweep result.
    ///
    /// Complex blocks contribute `20 log10 |s|` (dB) and `arg s` (radians).
    /// Phase-formatted blocks are already in degrees and contribute one
    /// column.
    pub fn from_result(result: &SweepResult) -> Self {
        let mut columns = vec![result.axis_kind().label().to_string()];
        let mut series: Vec<Vec<f64>> = Vec::new();

        for (name, block) in &result.measurements {
            if let SampleBlock::Complex(samples) = block {
                columns.push(format!("{} log mag [dB]", name));
                series.push(samples.iter().map(|s| 20.0 * s.norm().log10()).collect());
            }
        }
        for (name, block) in &result.measurements {
            match block {
                SampleBlock::Complex(samples) => {
                    columns.push(format!("{} phase [rad]", name));
                    series.push(samples.iter().map(|s| s.arg()).collect());
                }
                SampleBlock::Real(values) => {
                    columns.push(format!("{} phase [deg]", name));
                    series.push(values.clone());
                }
            }
        }

        let rows = result
            .axis
            .iter()
            .enumerate()
            .map(|(i, x)| {
                std::iter::once(*x)
                    .chain(series.iter().map(|col| col.get(i).copied().unwrap_or(f64::NAN)))
                    .collect()
            })
            .collect();

        Self {
            columns,
            rows,
            metadata: TableMetadata {
                independent: result.axis_kind().label().to_string(),
                sweep_type: result.sweep_type,
                parameters: BTreeMap::new(),
                acquired_at: Utc::now(),
            },
        }
    }

    /// Values of one column, by label.
    pub fn column(&self, label: &str) -> Option<Vec<f64>> {
        let index = self.columns.iter().position(|c| c == label)?;
        Some(self.rows.iter().map(|row| row[index]).collect())
    }
}
