//! rfsweep library: software-defined radio band scanner.
//!
//! Sweeps a receiver across configured frequency ranges one bandwidth-wide
//! sub-band at a time, estimates each sub-band's power spectrum, ranks the
//! strongest bins outside ignored ranges, and records signals that clear the
//! noise floor.
//!
//! Pipeline per sub-band, leaves first:
//! - [`range`]: range/bandwidth reconciliation, done once at startup
//! - [`spectrum`]: tune, capture, FFT
//! - [`filter`]: top-N candidates outside ignored ranges
//! - [`detector`]: noise floor and trigger decision
//! - [`scan`]: the sweep loop and per-pass aggregation
//! - [`record`]: what happens on a trigger
//!
//! Receivers sit behind [`device::Receiver`]. [`sim::SimulatedReceiver`]
//! needs no hardware; `rtlsdr::RtlSdrReceiver` (feature `rtlsdr`) drives an
//! RTL2832U dongle.

pub mod config;
pub mod defaults;
pub mod detector;
pub mod device;
pub mod error;
pub mod filter;
pub mod protocol;
pub mod range;
pub mod record;
#[cfg(feature = "rtlsdr")]
pub mod rtlsdr;
pub mod scan;
pub mod sim;
pub mod spectrum;

pub use config::ScanConfig;
pub use error::{ScanError, ScanResult};
pub use scan::{PassReport, Scanner, ShutdownToken, SweepPlan};
