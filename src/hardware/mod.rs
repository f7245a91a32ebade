//! Instrument drivers.

pub mod pna;
