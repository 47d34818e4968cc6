//! Receiver abstraction.
//!
//! The scan loop only needs a handful of operations from the radio: tune,
//! set gain and sample rate, and pull a block of complex samples. Backends
//! implement [`Receiver`]; the loop owns exactly one of them for its whole
//! lifetime.

use num_complex::Complex32;
use thiserror::Error;

/// Receiver failures. The device state is assumed unrecoverable after any
/// of these.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("librtlsdr not found - install the rtl-sdr package")]
    LibraryNotFound,

    #[error("no receiver at index {0}")]
    NotFound(u32),

    #[error("open failed: error code {0}")]
    OpenFailed(i32),

    #[error("{operation} failed (error code {code})")]
    OperationFailed { operation: &'static str, code: i32 },

    #[error("short read: got {got} bytes, expected {expected}")]
    ShortRead { expected: usize, got: usize },

    #[error("frequency {0} Hz is outside the tuner range")]
    FrequencyOutOfRange(i64),

    #[error("backend not available: {0}")]
    Unsupported(&'static str),
}

/// Tuner gain setting.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TunerGain {
    /// Hardware AGC
    #[default]
    Auto,
    /// Manual gain in dB
    Manual(f64),
}

/// Exclusive handle to a sample source.
///
/// Methods take `&mut self`: tuning and capture on one handle are strictly
/// sequential.
pub trait Receiver {
    fn set_frequency_correction(&mut self, ppm: i32) -> Result<(), DeviceError>;

    fn set_tuner_gain(&mut self, gain: TunerGain) -> Result<(), DeviceError>;

    fn set_sample_rate(&mut self, rate_hz: u32) -> Result<(), DeviceError>;

    fn sample_rate(&self) -> u32;

    fn set_center_frequency(&mut self, freq_hz: u32) -> Result<(), DeviceError>;

    fn center_frequency(&self) -> u32;

    /// Blocks until `count` samples have been captured at the current tuning.
    fn read_samples(&mut self, count: usize) -> Result<Vec<Complex32>, DeviceError>;
}

impl<R: Receiver + ?Sized> Receiver for &mut R {
    fn set_frequency_correction(&mut self, ppm: i32) -> Result<(), DeviceError> {
        (**self).set_frequency_correction(ppm)
    }

    fn set_tuner_gain(&mut self, gain: TunerGain) -> Result<(), DeviceError> {
        (**self).set_tuner_gain(gain)
    }

    fn set_sample_rate(&mut self, rate_hz: u32) -> Result<(), DeviceError> {
        (**self).set_sample_rate(rate_hz)
    }

    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn set_center_frequency(&mut self, freq_hz: u32) -> Result<(), DeviceError> {
        (**self).set_center_frequency(freq_hz)
    }

    fn center_frequency(&self) -> u32 {
        (**self).center_frequency()
    }

    fn read_samples(&mut self, count: usize) -> Result<Vec<Complex32>, DeviceError> {
        (**self).read_samples(count)
    }
}

impl<R: Receiver + ?Sized> Receiver for Box<R> {
    fn set_frequency_correction(&mut self, ppm: i32) -> Result<(), DeviceError> {
        (**self).set_frequency_correction(ppm)
    }

    fn set_tuner_gain(&mut self, gain: TunerGain) -> Result<(), DeviceError> {
        (**self).set_tuner_gain(gain)
    }

    fn set_sample_rate(&mut self, rate_hz: u32) -> Result<(), DeviceError> {
        (**self).set_sample_rate(rate_hz)
    }

    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn set_center_frequency(&mut self, freq_hz: u32) -> Result<(), DeviceError> {
        (**self).set_center_frequency(freq_hz)
    }

    fn center_frequency(&self) -> u32 {
        (**self).center_frequency()
    }

    fn read_samples(&mut self, count: usize) -> Result<Vec<Complex32>, DeviceError> {
        (**self).read_samples(count)
    }
}

/// Tune to a signed frequency, rejecting anything a 32-bit tuner register
/// cannot hold.
pub fn tune<R: Receiver + ?Sized>(receiver: &mut R, freq_hz: i64) -> Result<(), DeviceError> {
    let hz = u32::try_from(freq_hz).map_err(|_| DeviceError::FrequencyOutOfRange(freq_hz))?;
    receiver.set_center_frequency(hz)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedReceiver;

    #[test]
    fn tune_rejects_negative_frequency() {
        let mut rx = SimulatedReceiver::new(1);
        assert_eq!(
            tune(&mut rx, -1),
            Err(DeviceError::FrequencyOutOfRange(-1))
        );
    }

    #[test]
    fn tune_rejects_frequency_above_u32() {
        let mut rx = SimulatedReceiver::new(1);
        let f = u32::MAX as i64 + 1;
        assert_eq!(tune(&mut rx, f), Err(DeviceError::FrequencyOutOfRange(f)));
    }

    #[test]
    fn tune_through_mut_reference() {
        let mut rx = SimulatedReceiver::new(1);
        let mut handle = &mut rx;
        tune(&mut handle, 433_920_000).unwrap();
        assert_eq!(rx.center_frequency(), 433_920_000);
    }

    #[test]
    fn boxed_receiver_forwards() {
        let mut rx: Box<dyn Receiver> = Box::new(SimulatedReceiver::new(1));
        tune(&mut rx, 100_000_000).unwrap();
        rx.set_sample_rate(1_000).unwrap();
        assert_eq!(rx.center_frequency(), 100_000_000);
        assert_eq!(rx.read_samples(4).unwrap().len(), 4);
    }

    #[test]
    fn default_gain_is_auto() {
        assert_eq!(TunerGain::default(), TunerGain::Auto);
    }
}
