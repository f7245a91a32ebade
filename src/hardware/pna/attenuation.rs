//! Source attenuator selection for power sweeps.
//!
//! The source can only level over a 50 dB window whose position depends on
//! the step attenuator: with `a` dB of attenuation the reachable range is
//! `[-a - 30, -a + 20]` dBm.

use crate::error::{AppResult, PnaError};

/// Attenuator steps available on the source, in dB.
pub const ATTENUATION_STEPS: [u32; 7] = [0, 10, 20, 30, 40, 50, 60];

/// Power window reachable with a given attenuation, as (min, max) dBm.
pub fn power_window(attenuation: u32) -> (f64, f64) {
    let a = f64::from(attenuation);
    (-a - 30.0, -a + 20.0)
}

/// Pick the smallest attenuation whose window contains `[start, stop]`.
///
/// # Errors
///
/// [`PnaError::Validation`] for non-finite bounds, [`PnaError::Range`] when no
/// step covers both bounds.
pub fn select_attenuation(start: f64, stop: f64) -> AppResult<u32> {
    if !start.is_finite() || !stop.is_finite() {
        return Err(PnaError::Validation(format!(
            "Power bounds must be finite, got [{}, {}] dBm",
            start, stop
        )));
    }

    let (low, high) = if start <= stop { (start, stop) } else { (stop, start) };

    ATTENUATION_STEPS
        .into_iter()
        .find(|&a| {
            let (min, max) = power_window(a);
            low >= min && high <= max
        })
        .ok_or_else(|| {
            PnaError::Range(format!(
                "No attenuation step covers [{}, {}] dBm",
                start, stop
            ))
        })
}
