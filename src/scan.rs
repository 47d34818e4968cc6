//! The sweep loop.
//!
//! One pass visits every sub-band of every normalized range in order:
//! estimate the spectrum, filter candidates, detect the best signal, and
//! hand triggered signals to the recorder. Sub-band results are folded into
//! a [`ScanPassAggregate`] and summarized as a [`PassReport`] at the end of
//! the pass.
//!
//! Everything runs on the calling thread. Cancellation is cooperative and
//! only observed between passes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::ScanConfig;
use crate::defaults::SEPARATOR_WIDTH;
use crate::detector::{detect_best_signal, BestSignal};
use crate::device::Receiver;
use crate::error::{ScanError, ScanResult};
use crate::filter::{filter_frequencies, Candidate};
use crate::protocol::FrequencyPower;
use crate::range::{normalize_ranges, FrequencyRange};
use crate::record::Recorder;
use crate::spectrum::SpectrumEstimator;

// ── Shutdown ───────────────────────────────────────────────────────────

/// Shared stop flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken(Arc<AtomicBool>);

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the loop to stop after the current pass.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Lifecycle of a [`Scanner`]. `Stopping` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Running,
    Stopping,
}

// ── Pass results ───────────────────────────────────────────────────────

/// Outcome of one sub-band capture.
#[derive(Debug, Clone, PartialEq)]
pub struct SubBandResult {
    /// Index into the normalized range list
    pub range_index: usize,
    pub start: i64,
    pub stop: i64,
    /// Filtered candidates, descending power
    pub candidates: Vec<Candidate>,
    pub best: BestSignal,
}

/// Fold of every sub-band result of one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanPassAggregate {
    results: Vec<SubBandResult>,
}

impl ScanPassAggregate {
    pub fn push(&mut self, result: SubBandResult) {
        self.results.push(result);
    }

    pub fn sub_bands(&self) -> &[SubBandResult] {
        &self.results
    }

    pub fn any_triggered(&self) -> bool {
        self.results.iter().any(|r| r.best.triggered)
    }

    /// Best signals that cleared their noise floor, in sweep order
    pub fn triggered(&self) -> impl Iterator<Item = &BestSignal> {
        self.results
            .iter()
            .map(|r| &r.best)
            .filter(|b| b.triggered)
    }

    /// Strongest `top_n` candidates across the whole pass, ordered by
    /// ascending frequency. `top_n` is floored to 1.
    pub fn best_frequencies(&self, top_n: usize) -> Vec<Candidate> {
        let mut all: Vec<Candidate> = self
            .results
            .iter()
            .flat_map(|r| r.candidates.iter().copied())
            .collect();
        all.sort_by(|a, b| b.power.total_cmp(&a.power));
        all.truncate(top_n.max(1));
        all.sort_by_key(|c| c.frequency);
        all
    }
}

impl FromIterator<SubBandResult> for ScanPassAggregate {
    fn from_iter<I: IntoIterator<Item = SubBandResult>>(iter: I) -> Self {
        Self {
            results: iter.into_iter().collect(),
        }
    }
}

/// Summary of one finished pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    /// Zero-based pass counter
    pub pass: u64,
    pub sub_bands: usize,
    pub triggered: Vec<BestSignal>,
    /// Reported candidates, ascending frequency. Empty when reporting was
    /// suppressed because nothing triggered.
    pub reported: Vec<Candidate>,
}

impl PassReport {
    /// Build the end-of-pass report.
    ///
    /// With `only_on_trigger` set, nothing is reported unless some sub-band
    /// triggered.
    pub fn from_aggregate(
        pass: u64,
        aggregate: &ScanPassAggregate,
        top_n: usize,
        only_on_trigger: bool,
    ) -> Self {
        let reported = if aggregate.any_triggered() || !only_on_trigger {
            aggregate.best_frequencies(top_n)
        } else {
            Vec::new()
        };
        Self {
            pass,
            sub_bands: aggregate.sub_bands().len(),
            triggered: aggregate.triggered().copied().collect(),
            reported,
        }
    }

    pub fn any_triggered(&self) -> bool {
        !self.triggered.is_empty()
    }

    /// Text report lines, one per reported candidate
    pub fn lines(&self) -> impl Iterator<Item = FrequencyPower> + '_ {
        self.reported.iter().copied().map(FrequencyPower::from)
    }

    /// Debug log output for the end of the pass: the report lines, then a
    /// separator when more than one candidate was reported.
    pub fn log_lines(&self) -> Vec<String> {
        let mut out: Vec<String> = self.lines().map(|line| line.to_string()).collect();
        if self.reported.len() > 1 {
            out.push("-".repeat(SEPARATOR_WIDTH));
        }
        out
    }
}

// ── Sweep plan ─────────────────────────────────────────────────────────

/// Sweep layout derived from the configuration alone.
///
/// Building one needs no receiver, so configuration errors surface before
/// any hardware is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepPlan {
    /// Ranges after bandwidth normalization
    pub ranges: Vec<FrequencyRange>,
    /// Receiver sample rate, equal to the bandwidth
    pub sample_rate: u32,
}

impl SweepPlan {
    pub fn new(config: &ScanConfig) -> ScanResult<Self> {
        if config.samples == 0 || config.fft == 0 {
            return Err(ScanError::config("samples and fft must be positive"));
        }
        let ranges = normalize_ranges(&config.frequencies_ranges, config.bandwidth)?;
        let sample_rate = u32::try_from(config.bandwidth).map_err(|_| {
            ScanError::config(format!(
                "bandwidth {} Hz is not a valid sample rate",
                config.bandwidth
            ))
        })?;
        Ok(Self {
            ranges,
            sample_rate,
        })
    }
}

// ── Scanner ────────────────────────────────────────────────────────────

/// Owns the receiver and recorder for the life of a scan.
pub struct Scanner<R: Receiver, W: Recorder> {
    receiver: R,
    recorder: W,
    estimator: SpectrumEstimator,
    config: ScanConfig,
    ranges: Vec<FrequencyRange>,
    state: ScanState,
    passes: u64,
}

impl<R: Receiver, W: Recorder> Scanner<R, W> {
    /// Plan the sweep, then configure the receiver. The receiver is not
    /// touched when planning fails.
    pub fn open(receiver: R, recorder: W, config: ScanConfig) -> ScanResult<Self> {
        let plan = SweepPlan::new(&config)?;
        Self::new(receiver, recorder, config, plan)
    }

    /// Configure the receiver for `plan` (frequency correction, tuner gain,
    /// sample rate).
    pub fn new(
        mut receiver: R,
        recorder: W,
        config: ScanConfig,
        plan: SweepPlan,
    ) -> ScanResult<Self> {
        receiver.set_frequency_correction(config.ppm_error)?;
        receiver.set_tuner_gain(config.tuner_gain)?;
        receiver.set_sample_rate(plan.sample_rate)?;

        Ok(Self {
            receiver,
            recorder,
            estimator: SpectrumEstimator::new(config.fft),
            config,
            ranges: plan.ranges,
            state: ScanState::Running,
            passes: 0,
        })
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Ranges after bandwidth normalization
    pub fn ranges(&self) -> &[FrequencyRange] {
        &self.ranges
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Completed passes so far
    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn receiver(&self) -> &R {
        &self.receiver
    }

    pub fn recorder(&self) -> &W {
        &self.recorder
    }

    /// Release the receiver and recorder.
    pub fn into_parts(self) -> (R, W) {
        (self.receiver, self.recorder)
    }

    /// Sweep every sub-band once.
    ///
    /// Any device or recording failure aborts the pass and is returned.
    pub fn scan_pass(&mut self) -> ScanResult<PassReport> {
        let Self {
            receiver,
            recorder,
            estimator,
            config,
            ranges,
            ..
        } = self;

        let mut aggregate = ScanPassAggregate::default();
        for (range_index, range) in ranges.iter().enumerate() {
            for (start, stop) in range.sub_bands(config.bandwidth) {
                let spectrum = estimator.estimate(receiver, start, stop, config.samples)?;
                let candidates = filter_frequencies(
                    &spectrum,
                    &config.ignored_frequencies_ranges,
                    config.print_best_frequencies,
                );
                let best = detect_best_signal(&spectrum, &candidates, config.noise_level);

                if best.triggered && !config.disable_recording {
                    recorder.record(receiver, &best, range)?;
                }

                aggregate.push(SubBandResult {
                    range_index,
                    start,
                    stop,
                    candidates,
                    best,
                });
            }
        }

        let report = PassReport::from_aggregate(
            self.passes,
            &aggregate,
            self.config.print_best_frequencies,
            self.config.filter_best_frequencies,
        );
        for line in report.log_lines() {
            log::debug!("{}", line);
        }

        self.passes += 1;
        Ok(report)
    }

    /// Run passes until `token` is cancelled, calling `on_pass` after each.
    ///
    /// Returns the number of passes completed by this call. The scanner is
    /// `Stopping` afterwards, whether it returned normally or with an error.
    pub fn run<F>(&mut self, token: &ShutdownToken, mut on_pass: F) -> ScanResult<u64>
    where
        F: FnMut(&PassReport),
    {
        let first = self.passes;
        while self.state == ScanState::Running && !token.is_cancelled() {
            match self.scan_pass() {
                Ok(report) => on_pass(&report),
                Err(e) => {
                    self.state = ScanState::Stopping;
                    return Err(e);
                }
            }
        }
        self.state = ScanState::Stopping;
        log::info!("scanning stopped after {} passes", self.passes);
        Ok(self.passes - first)
    }
}
