//! Simulated receiver.
//!
//! Synthesizes a set of continuous-wave carriers plus uniform noise at
//! whatever frequency the receiver is tuned to. Carriers outside the
//! current Nyquist band are not visible. Used for dry runs without
//! hardware and throughout the test suite.

use std::f64::consts::TAU;

use num_complex::Complex32;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::device::{DeviceError, Receiver, TunerGain};

/// A continuous-wave emitter seen by the simulated receiver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Carrier {
    pub frequency: i64,
    pub amplitude: f32,
}

/// In-memory [`Receiver`] with deterministic noise.
#[derive(Debug)]
pub struct SimulatedReceiver {
    carriers: Vec<Carrier>,
    noise_amplitude: f32,
    rng: StdRng,
    center_freq: u32,
    sample_rate: u32,
    ppm: i32,
    gain: TunerGain,
    reads: usize,
    tunings: Vec<u32>,
}

impl SimulatedReceiver {
    /// Noise-only receiver, seeded for reproducible captures.
    pub fn new(seed: u64) -> Self {
        Self {
            carriers: Vec::new(),
            noise_amplitude: 0.01,
            rng: StdRng::seed_from_u64(seed),
            center_freq: 0,
            sample_rate: 2_400_000,
            ppm: 0,
            gain: TunerGain::Auto,
            reads: 0,
            tunings: Vec::new(),
        }
    }

    pub fn with_carrier(mut self, frequency: i64, amplitude: f32) -> Self {
        self.carriers.push(Carrier {
            frequency,
            amplitude,
        });
        self
    }

    pub fn with_noise(mut self, amplitude: f32) -> Self {
        self.noise_amplitude = amplitude;
        self
    }

    /// Number of completed `read_samples` calls
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Every center frequency tuned so far, in order
    pub fn tunings(&self) -> &[u32] {
        &self.tunings
    }

    pub fn frequency_correction(&self) -> i32 {
        self.ppm
    }

    pub fn tuner_gain(&self) -> TunerGain {
        self.gain
    }
}

impl Receiver for SimulatedReceiver {
    fn set_frequency_correction(&mut self, ppm: i32) -> Result<(), DeviceError> {
        self.ppm = ppm;
        Ok(())
    }

    fn set_tuner_gain(&mut self, gain: TunerGain) -> Result<(), DeviceError> {
        self.gain = gain;
        Ok(())
    }

    fn set_sample_rate(&mut self, rate_hz: u32) -> Result<(), DeviceError> {
        if rate_hz == 0 {
            return Err(DeviceError::OperationFailed {
                operation: "set_sample_rate",
                code: -22,
            });
        }
        self.sample_rate = rate_hz;
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn set_center_frequency(&mut self, freq_hz: u32) -> Result<(), DeviceError> {
        self.center_freq = freq_hz;
        self.tunings.push(freq_hz);
        Ok(())
    }

    fn center_frequency(&self) -> u32 {
        self.center_freq
    }

    fn read_samples(&mut self, count: usize) -> Result<Vec<Complex32>, DeviceError> {
        let rate = self.sample_rate as f64;
        let nyquist = rate / 2.0;
        let center = self.center_freq as i64;

        // Normalized frequency (cycles/sample) of every carrier in band
        let visible: Vec<(f64, f32)> = self
            .carriers
            .iter()
            .filter_map(|c| {
                let offset = (c.frequency - center) as f64;
                (offset.abs() < nyquist).then(|| (offset / rate, c.amplitude))
            })
            .collect();

        let noise = self.noise_amplitude;
        let samples = (0..count)
            .map(|n| {
                let mut s = visible.iter().fold(Complex32::new(0.0, 0.0), |acc, &(f, a)| {
                    // Phase wrapped per sample keeps precision for long blocks
                    let phase = (TAU * (f * n as f64).fract()) as f32;
                    acc + Complex32::from_polar(a, phase)
                });
                if noise > 0.0 {
                    s.re += noise * self.rng.random_range(-1.0f32..1.0);
                    s.im += noise * self.rng.random_range(-1.0f32..1.0);
                }
                s
            })
            .collect();

        self.reads += 1;
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noise_free_capture_of_nothing_is_silent() {
        let mut rx = SimulatedReceiver::new(0).with_noise(0.0);
        rx.set_center_frequency(100_000_000).unwrap();
        let block = rx.read_samples(64).unwrap();
        assert_eq!(block.len(), 64);
        assert!(block.iter().all(|s| s.norm() == 0.0));
    }

    #[test]
    fn carrier_in_band_has_its_amplitude() {
        let mut rx = SimulatedReceiver::new(0)
            .with_noise(0.0)
            .with_carrier(100_000_250, 0.5);
        rx.set_sample_rate(1_000).unwrap();
        rx.set_center_frequency(100_000_000).unwrap();
        let block = rx.read_samples(16).unwrap();
        for s in block {
            assert!((s.norm() - 0.5).abs() < 1e-4);
        }
    }

    #[test]
    fn carrier_out_of_band_is_invisible() {
        let mut rx = SimulatedReceiver::new(0)
            .with_noise(0.0)
            .with_carrier(100_010_000, 1.0);
        rx.set_sample_rate(1_000).unwrap();
        rx.set_center_frequency(100_000_000).unwrap();
        let block = rx.read_samples(16).unwrap();
        assert!(block.iter().all(|s| s.norm() == 0.0));
    }

    #[test]
    fn same_seed_same_noise() {
        let mut a = SimulatedReceiver::new(42);
        let mut b = SimulatedReceiver::new(42);
        assert_eq!(a.read_samples(32).unwrap(), b.read_samples(32).unwrap());
    }

    #[test]
    fn tracks_tunings_and_reads() {
        let mut rx = SimulatedReceiver::new(0);
        rx.set_center_frequency(1).unwrap();
        rx.set_center_frequency(2).unwrap();
        rx.read_samples(1).unwrap();
        assert_eq!(rx.tunings(), &[1, 2]);
        assert_eq!(rx.reads(), 1);
    }

    #[test]
    fn zero_sample_rate_is_rejected() {
        let mut rx = SimulatedReceiver::new(0);
        assert!(rx.set_sample_rate(0).is_err());
    }
}
