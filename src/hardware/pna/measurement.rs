//! Measurement identities and the instrument parameter catalog.
//!
//! The analyzer keeps a catalog of named measurement parameters. This driver
//! owns the entries whose names are `<prefix><measurement>` (for example
//! `daq_S21`). Because the name is a pure function of the measurement, the
//! driver never has to remember which names it created: the catalog itself is
//! the only cross-call state, and it lives on the instrument.
//!
//! Reconciling the catalog with a desired set is split in two:
//! - [`CatalogDiff::compute`] is a pure function over the parsed catalog and
//!   the desired set, testable without hardware.
//! - the driver applies the resulting commands in order (deletions first).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::PnaError;

/// Two-port scattering parameter.
///
/// `Sij` is the wave received at port `i` when port `j` is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MeasurementName {
    /// Port 1 reflection
    S11,
    /// Reverse transmission (port 2 drives)
    S12,
    /// Forward transmission (port 1 drives)
    S21,
    /// Port 2 reflection
    S22,
}

impl MeasurementName {
    /// Every supported measurement, in canonical order.
    pub const ALL: [MeasurementName; 4] = [
        MeasurementName::S11,
        MeasurementName::S12,
        MeasurementName::S21,
        MeasurementName::S22,
    ];

    /// Canonical upper-case token, as sent to the instrument.
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementName::S11 => "S11",
            MeasurementName::S12 => "S12",
            MeasurementName::S21 => "S21",
            MeasurementName::S22 => "S22",
        }
    }

    /// Physical port that sources power for this measurement.
    pub fn source_port(&self) -> u8 {
        match self {
            MeasurementName::S11 | MeasurementName::S21 => 1,
            MeasurementName::S12 | MeasurementName::S22 => 2,
        }
    }

    /// Instrument-side parameter name owned by this driver.
    pub fn parameter_name(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.as_str())
    }
}

impl fmt::Display for MeasurementName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeasurementName {
    type Err = PnaError;

    /// Case-insensitive parse; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        MeasurementName::ALL
            .into_iter()
            .find(|m| m.as_str() == upper)
            .ok_or_else(|| PnaError::Validation(format!("Unknown measurement '{}'", s)))
    }
}

/// Ordered, duplicate-free set of measurements.
///
/// Order is the caller's order and drives the order of fetched results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementSet(Vec<MeasurementName>);

impl MeasurementSet {
    /// Empty set
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Build from caller-supplied names.
    ///
    /// Names are matched case-insensitively; duplicates collapse onto their
    /// first occurrence and unknown names are dropped.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for name in names {
            match name.as_ref().parse::<MeasurementName>() {
                Ok(measurement) => set.insert(measurement),
                Err(_) => tracing::debug!(name = name.as_ref(), "Dropping unknown measurement"),
            }
        }
        set
    }

    /// Append a measurement unless already present.
    pub fn insert(&mut self, measurement: MeasurementName) {
        if !self.0.contains(&measurement) {
            self.0.push(measurement);
        }
    }

    /// True if the measurement is in the set.
    pub fn contains(&self, measurement: MeasurementName) -> bool {
        self.0.contains(&measurement)
    }

    /// Measurements in caller order.
    pub fn iter(&self) -> impl Iterator<Item = MeasurementName> + '_ {
        self.0.iter().copied()
    }

    /// Number of measurements
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the set is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of distinct source ports the measurements drive.
    ///
    /// Each driven port needs its own pass over the sweep, so this scales the
    /// expected acquisition time.
    pub fn port_factor(&self) -> usize {
        self.0
            .iter()
            .map(MeasurementName::source_port)
            .collect::<BTreeSet<_>>()
            .len()
    }
}

impl FromIterator<MeasurementName> for MeasurementSet {
    fn from_iter<T: IntoIterator<Item = MeasurementName>>(iter: T) -> Self {
        let mut set = Self::new();
        for measurement in iter {
            set.insert(measurement);
        }
        set
    }
}

impl<'a> IntoIterator for &'a MeasurementSet {
    type Item = &'a MeasurementName;
    type IntoIter = std::slice::Iter<'a, MeasurementName>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// One entry of the instrument's parameter catalog.
///
/// The measurement is kept as the raw string the instrument reported, since
/// catalog entries created by other users may name measurements this driver
/// does not model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinedParameter {
    /// Instrument-side parameter name
    pub name: String,
    /// Measurement token as reported
    pub measurement: String,
}

impl DefinedParameter {
    /// Parsed measurement, if it is one this driver models.
    pub fn measurement_name(&self) -> Option<MeasurementName> {
        self.measurement.parse().ok()
    }
}

/// Parse a `CALC:PAR:CAT?` response.
///
/// The response is a quoted, comma-separated flat list alternating
/// parameter name and measurement. A trailing unpaired element (including
/// the `NO CATALOG` reply of an empty catalog) is ignored.
pub fn parse_catalog(response: &str) -> Vec<DefinedParameter> {
    let body = response.trim().trim_matches('"').trim();
    if body.is_empty() {
        return Vec::new();
    }

    let items: Vec<&str> = body.split(',').map(str::trim).collect();
    if items.len() % 2 != 0 {
        tracing::warn!(
            entries = items.len(),
            response = body,
            "Catalog response has an odd number of entries; ignoring the last one"
        );
    }

    items
        .chunks_exact(2)
        .map(|pair| DefinedParameter {
            name: pair[0].to_string(),
            measurement: pair[1].to_string(),
        })
        .collect()
}

/// Commands needed to turn the defined catalog into the desired one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogDiff {
    /// Parameter names to delete
    pub deletions: Vec<String>,
    /// Parameters to define, as (name, measurement)
    pub additions: Vec<(String, MeasurementName)>,
}

impl CatalogDiff {
    /// Compute the minimal delta.
    ///
    /// An entry is deleted when its measurement is not desired (recognized or
    /// not), or when it holds the parameter name of a desired measurement but
    /// measures something else. A desired measurement is added when its
    /// parameter name does not survive the deletions.
    pub fn compute(defined: &[DefinedParameter], desired: &MeasurementSet, prefix: &str) -> Self {
        let (deletions, kept): (Vec<&DefinedParameter>, Vec<&DefinedParameter>) =
            defined.iter().partition(|param| match param.measurement_name() {
                Some(measurement) => {
                    !desired.contains(measurement)
                        || desired.iter().any(|wanted| {
                            wanted != measurement && wanted.parameter_name(prefix) == param.name
                        })
                }
                None => true,
            });

        let additions = desired
            .iter()
            .map(|measurement| (measurement.parameter_name(prefix), measurement))
            .filter(|(name, _)| !kept.iter().any(|param| &param.name == name))
            .collect();

        Self {
            deletions: deletions.into_iter().map(|param| param.name.clone()).collect(),
            additions,
        }
    }

    /// True when no command is needed.
    pub fn is_empty(&self) -> bool {
        self.deletions.is_empty() && self.additions.is_empty()
    }

    /// Command strings in issue order: all deletions, then all additions.
    pub fn commands(&self) -> Vec<String> {
        self.deletions
            .iter()
            .map(|name| delete_command(name))
            .chain(
                self.additions
                    .iter()
                    .map(|(name, measurement)| define_command(name, *measurement)),
            )
            .collect()
    }
}

/// `CALC:PAR:DEL '<name>'`
pub fn delete_command(name: &str) -> String {
    format!("CALC:PAR:DEL '{}'", name)
}

/// `CALC:PAR:DEF '<name>',<measurement>`
pub fn define_command(name: &str, measurement: MeasurementName) -> String {
    format!("CALC:PAR:DEF '{}',{}", name, measurement)
}

/// `CALC:PAR:SEL '<name>'`
pub fn select_command(name: &str) -> String {
    format!("CALC:PAR:SEL '{}'", name)
}
