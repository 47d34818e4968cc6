//! Per-sub-band power spectrum estimation.
//!
//! Tune, capture one block, FFT, log-magnitude. Bins are returned in
//! ascending frequency order with the tuned center at index `len / 2`.

use std::fmt;
use std::sync::Arc;

use num_complex::Complex32;
use rustfft::{Fft, FftPlanner};

use crate::defaults::MAGNITUDE_FLOOR;
use crate::device::{self, Receiver};
use crate::error::ScanResult;

/// Frequency/power pairs for one capture.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    /// Tuned center frequency (Hz)
    pub center: i64,
    /// Bin frequencies (Hz), ascending
    pub frequencies: Vec<i64>,
    /// log10 magnitude per bin
    pub powers: Vec<f64>,
}

impl Spectrum {
    pub fn len(&self) -> usize {
        self.powers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.powers.is_empty()
    }
}

/// FFT-based spectrum estimator with a cached plan.
pub struct SpectrumEstimator {
    size: usize,
    fft: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex32>,
}

impl fmt::Debug for SpectrumEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumEstimator")
            .field("size", &self.size)
            .finish()
    }
}

impl SpectrumEstimator {
    /// Plan a forward transform of `size` points. `size` must be non-zero.
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let scratch = vec![Complex32::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        Self { size, fft, scratch }
    }

    /// Tune to the middle of `[start, stop)`, capture `samples`, and transform.
    ///
    /// Mutates the receiver's center frequency.
    pub fn estimate<R: Receiver + ?Sized>(
        &mut self,
        receiver: &mut R,
        start: i64,
        stop: i64,
        samples: usize,
    ) -> ScanResult<Spectrum> {
        let center = (start + stop) / 2;
        device::tune(receiver, center)?;
        let block = receiver.read_samples(samples)?;
        Ok(self.compute(&block, receiver.sample_rate(), center))
    }

    /// Transform an already captured block.
    ///
    /// The block is zero-padded or truncated to the transform size. The
    /// result holds `min(size, block.len())` bins centered on `center`.
    pub fn compute(&mut self, block: &[Complex32], sample_rate: u32, center: i64) -> Spectrum {
        let n = self.size;
        let mut buffer: Vec<Complex32> = block.iter().copied().take(n).collect();
        buffer.resize(n, Complex32::new(0.0, 0.0));
        self.fft.process_with_scratch(&mut buffer, &mut self.scratch);

        let len = n.min(block.len());
        let first = n / 2 - len / 2;
        let rate = sample_rate as f64;

        let mut frequencies = Vec::with_capacity(len);
        let mut powers = Vec::with_capacity(len);
        for i in first..first + len {
            // fftshift: shifted index i holds raw bin k
            let k = (i + n - n / 2) % n;
            let offset = bin_offset(k, n) as f64 * rate / n as f64;
            frequencies.push((center as f64 + offset) as i64);
            let magnitude = buffer[k].norm().max(MAGNITUDE_FLOOR);
            powers.push((magnitude as f64).log10());
        }

        Spectrum {
            center,
            frequencies,
            powers,
        }
    }
}

/// Signed bin number for raw FFT index `k` (the `fftfreq` layout).
fn bin_offset(k: usize, n: usize) -> i64 {
    if k <= (n - 1) / 2 {
        k as i64
    } else {
        k as i64 - n as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedReceiver;

    fn argmax(values: &[f64]) -> usize {
        values
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap()
    }

    // ── bin layout ──────────────────────────────────────────────────

    #[test]
    fn bin_offsets_even() {
        let offsets: Vec<i64> = (0..4).map(|k| bin_offset(k, 4)).collect();
        assert_eq!(offsets, vec![0, 1, -2, -1]);
    }

    #[test]
    fn bin_offsets_odd() {
        let offsets: Vec<i64> = (0..5).map(|k| bin_offset(k, 5)).collect();
        assert_eq!(offsets, vec![0, 1, 2, -2, -1]);
    }

    #[test]
    fn frequencies_ascend_around_center() {
        let mut est = SpectrumEstimator::new(8);
        let block = vec![Complex32::new(1.0, 0.0); 8];
        let spectrum = est.compute(&block, 8_000, 1_000_000);
        assert_eq!(
            spectrum.frequencies,
            vec![996_000, 997_000, 998_000, 999_000, 1_000_000, 1_001_000, 1_002_000, 1_003_000]
        );
        assert_eq!(spectrum.frequencies[spectrum.len() / 2], spectrum.center);
    }

    // ── power estimation ────────────────────────────────────────────

    #[test]
    fn dc_block_peaks_at_center() {
        let mut est = SpectrumEstimator::new(16);
        let block = vec![Complex32::new(1.0, 0.0); 16];
        let spectrum = est.compute(&block, 16_000, 433_000_000);
        let peak = argmax(&spectrum.powers);
        assert_eq!(spectrum.frequencies[peak], 433_000_000);
        // |X[0]| = 16 → log10(16)
        assert!((spectrum.powers[peak] - 16f64.log10()).abs() < 1e-5);
    }

    #[test]
    fn silent_block_is_floored_not_infinite() {
        let mut est = SpectrumEstimator::new(32);
        let block = vec![Complex32::new(0.0, 0.0); 32];
        let spectrum = est.compute(&block, 32_000, 1_000_000);
        let floor = (MAGNITUDE_FLOOR as f64).log10();
        assert!(spectrum.powers.iter().all(|p| p.is_finite()));
        assert!(spectrum.powers.iter().all(|p| (*p - floor).abs() < 1e-6));
    }

    #[test]
    fn short_block_is_zero_padded_and_output_shrinks() {
        let mut est = SpectrumEstimator::new(64);
        let block = vec![Complex32::new(1.0, 0.0); 16];
        let spectrum = est.compute(&block, 64_000, 2_000_000);
        assert_eq!(spectrum.len(), 16);
        assert_eq!(spectrum.frequencies.len(), spectrum.powers.len());
        assert!(spectrum.frequencies.contains(&2_000_000));
    }

    #[test]
    fn long_block_is_truncated_to_transform_size() {
        let mut est = SpectrumEstimator::new(32);
        let block = vec![Complex32::new(1.0, 0.0); 100];
        let spectrum = est.compute(&block, 32_000, 2_000_000);
        assert_eq!(spectrum.len(), 32);
    }

    // ── estimate (tune + capture) ───────────────────────────────────

    #[test]
    fn estimate_tunes_to_midpoint_and_finds_carrier() {
        let mut rx = SimulatedReceiver::new(7)
            .with_noise(0.0)
            .with_carrier(2_400_700, 1.0);
        rx.set_sample_rate(1_000).unwrap();
        let mut est = SpectrumEstimator::new(1_000);
        let spectrum = est
            .estimate(&mut rx, 2_400_000, 2_401_000, 1_000)
            .unwrap();

        assert_eq!(rx.center_frequency(), 2_400_500);
        assert_eq!(spectrum.center, 2_400_500);
        assert_eq!(spectrum.len(), 1_000);
        let peak = argmax(&spectrum.powers);
        assert_eq!(spectrum.frequencies[peak], 2_400_700);
        assert!((spectrum.powers[peak] - 3.0).abs() < 1e-3);
    }

    #[test]
    fn estimate_rejects_untunable_center() {
        let mut rx = SimulatedReceiver::new(0);
        let mut est = SpectrumEstimator::new(8);
        let err = est.estimate(&mut rx, -10_000, -8_000, 8).unwrap_err();
        assert!(err.is_device());
    }
}
