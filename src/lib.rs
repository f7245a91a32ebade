//! # PNA DAQ Library
//!
//! Sweep acquisition for vector network analyzers controlled over SCPI. The
//! library turns sweep requests into instrument configuration, waits out the
//! acquisition, and decodes the binary trace data into complex S-parameters
//! or phase values.
//!
//! ## Crate Structure
//!
//! - **`adapters`**: The `DeviceChannel` trait (write / query / raw read) and
//!   a raw-socket `TcpChannel`.
//! - **`config`**: `PnaConfig`, loaded from TOML and `PNA_DAQ_` environment
//!   variables with figment.
//! - **`data`**: `ResultTable` flattening and CSV output.
//! - **`error`**: The `PnaError` enum, split into bad-input and device-failure
//!   categories.
//! - **`hardware`**: The analyzer driver: measurement catalog
//!   synchronization, block decoding, the sweep state machine and a
//!   simulated instrument.
//! - **`logging`**: `tracing-subscriber` setup.

pub mod adapters;
pub mod config;
pub mod data;
pub mod error;
pub mod hardware;
pub mod logging;

pub use error::{AppResult, PnaError};
pub use hardware::pna::PnaDriver;
