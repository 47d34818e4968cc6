//! Signal recording on trigger.
//!
//! The scan loop hands a triggered [`BestSignal`] to a [`Recorder`], which
//! may retune the receiver and capture as it sees fit. Recording is
//! synchronous: the sweep resumes only after `record` returns.
//!
//! [`SigMfRecorder`] writes each capture as a SigMF pair:
//!
//! - `<stem>.sigmf-data`: raw `cf32_le` I/Q samples
//! - `<stem>.sigmf-meta`: JSON metadata (rate, frequency, detection details)

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use num_complex::Complex32;
use serde::Serialize;

use crate::detector::BestSignal;
use crate::device::{self, Receiver};
use crate::error::{ScanError, ScanResult};
use crate::range::FrequencyRange;

/// SigMF core version written to metadata
pub const SIGMF_VERSION: &str = "1.0.0";

/// Persists a waveform for a triggered signal.
pub trait Recorder {
    fn record(
        &mut self,
        receiver: &mut dyn Receiver,
        signal: &BestSignal,
        range: &FrequencyRange,
    ) -> ScanResult<()>;
}

impl<T: Recorder + ?Sized> Recorder for &mut T {
    fn record(
        &mut self,
        receiver: &mut dyn Receiver,
        signal: &BestSignal,
        range: &FrequencyRange,
    ) -> ScanResult<()> {
        (**self).record(receiver, signal, range)
    }
}

impl<T: Recorder + ?Sized> Recorder for Box<T> {
    fn record(
        &mut self,
        receiver: &mut dyn Receiver,
        signal: &BestSignal,
        range: &FrequencyRange,
    ) -> ScanResult<()> {
        (**self).record(receiver, signal, range)
    }
}

/// Discards every trigger.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRecorder;

impl Recorder for NullRecorder {
    fn record(
        &mut self,
        _receiver: &mut dyn Receiver,
        _signal: &BestSignal,
        _range: &FrequencyRange,
    ) -> ScanResult<()> {
        Ok(())
    }
}

// ── SigMF metadata ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SigMfGlobal {
    #[serde(rename = "core:datatype")]
    pub datatype: &'static str,
    #[serde(rename = "core:sample_rate")]
    pub sample_rate: f64,
    #[serde(rename = "core:version")]
    pub version: &'static str,
    #[serde(rename = "core:description")]
    pub description: String,
    #[serde(rename = "core:recorder")]
    pub recorder: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SigMfCapture {
    #[serde(rename = "core:sample_start")]
    pub sample_start: u64,
    #[serde(rename = "core:frequency")]
    pub frequency: f64,
    #[serde(rename = "core:datetime")]
    pub datetime: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SigMfAnnotation {
    #[serde(rename = "core:sample_start")]
    pub sample_start: u64,
    #[serde(rename = "core:sample_count")]
    pub sample_count: u64,
    #[serde(rename = "core:label")]
    pub label: String,
    #[serde(rename = "rfsweep:power")]
    pub power: f64,
    #[serde(rename = "rfsweep:noise_level")]
    pub noise_level: f64,
    #[serde(rename = "rfsweep:range")]
    pub range: FrequencyRange,
}

#[derive(Debug, Clone, Serialize)]
pub struct SigMfMeta {
    pub global: SigMfGlobal,
    pub captures: Vec<SigMfCapture>,
    pub annotations: Vec<SigMfAnnotation>,
}

// ── SigMfRecorder ──────────────────────────────────────────────────────

/// Records a fixed-length capture at the detected frequency into a
/// directory of SigMF files.
#[derive(Debug, Clone)]
pub struct SigMfRecorder {
    directory: PathBuf,
    samples: usize,
    written: Vec<PathBuf>,
}

impl SigMfRecorder {
    /// The directory is created on first use.
    pub fn new(directory: impl Into<PathBuf>, samples: usize) -> Self {
        Self {
            directory: directory.into(),
            samples,
            written: Vec::new(),
        }
    }

    /// Metadata paths of every recording made so far
    pub fn recordings(&self) -> &[PathBuf] {
        &self.written
    }

    fn write_data(path: &Path, block: &[Complex32]) -> io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        for s in block {
            out.write_all(&s.re.to_le_bytes())?;
            out.write_all(&s.im.to_le_bytes())?;
        }
        out.flush()
    }

    fn write_meta(path: &Path, meta: &SigMfMeta) -> io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut out, meta).map_err(io::Error::from)?;
        out.flush()
    }
}

fn recording_error(path: &Path) -> impl FnOnce(io::Error) -> ScanError + '_ {
    move |source| ScanError::Recording {
        path: path.to_path_buf(),
        source,
    }
}

impl Recorder for SigMfRecorder {
    fn record(
        &mut self,
        receiver: &mut dyn Receiver,
        signal: &BestSignal,
        range: &FrequencyRange,
    ) -> ScanResult<()> {
        device::tune(&mut *receiver, signal.frequency)?;
        let block = receiver.read_samples(self.samples)?;

        let now = Utc::now();
        fs::create_dir_all(&self.directory).map_err(recording_error(&self.directory))?;
        let stem = format!("{}_{}Hz", now.format("%Y%m%dT%H%M%S%.3fZ"), signal.frequency);
        let data_path = self.directory.join(format!("{stem}.sigmf-data"));
        let meta_path = self.directory.join(format!("{stem}.sigmf-meta"));

        Self::write_data(&data_path, &block).map_err(recording_error(&data_path))?;

        let meta = SigMfMeta {
            global: SigMfGlobal {
                datatype: "cf32_le",
                sample_rate: receiver.sample_rate() as f64,
                version: SIGMF_VERSION,
                description: format!("signal above noise floor in {range}"),
                recorder: concat!("rfsweep ", env!("CARGO_PKG_VERSION")),
            },
            captures: vec![SigMfCapture {
                sample_start: 0,
                frequency: signal.frequency as f64,
                datetime: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            }],
            annotations: vec![SigMfAnnotation {
                sample_start: 0,
                sample_count: block.len() as u64,
                label: "detection".to_string(),
                power: signal.power,
                noise_level: signal.noise_level,
                range: *range,
            }],
        };
        Self::write_meta(&meta_path, &meta).map_err(recording_error(&meta_path))?;

        log::info!(
            "recorded {} samples at {} Hz (power {:.2}, noise {:.2}) to {}",
            block.len(),
            signal.frequency,
            signal.power,
            signal.noise_level,
            meta_path.display()
        );
        self.written.push(meta_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedReceiver;

    fn triggered(frequency: i64) -> BestSignal {
        BestSignal {
            frequency,
            power: 3.0,
            noise_level: -50.0,
            triggered: true,
        }
    }

    #[test]
    fn null_recorder_touches_nothing() {
        let mut rx = SimulatedReceiver::new(0);
        let range = FrequencyRange::new(0, 1_000);
        NullRecorder.record(&mut rx, &triggered(500), &range).unwrap();
        assert_eq!(rx.reads(), 0);
        assert!(rx.tunings().is_empty());
    }

    #[test]
    fn sigmf_recorder_writes_data_and_meta() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = SigMfRecorder::new(dir.path().join("captures"), 256);
        let mut rx = SimulatedReceiver::new(3).with_carrier(433_920_100, 0.5);
        rx.set_sample_rate(250_000).unwrap();
        let range = FrequencyRange::new(433_000_000, 434_000_000);

        rec.record(&mut rx, &triggered(433_920_000), &range).unwrap();

        assert_eq!(rx.tunings(), &[433_920_000]);
        assert_eq!(rec.recordings().len(), 1);
        let meta_path = &rec.recordings()[0];
        let data_path = meta_path.with_extension("sigmf-data");
        assert_eq!(fs::metadata(&data_path).unwrap().len(), 256 * 8);

        let meta: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(meta_path).unwrap()).unwrap();
        assert_eq!(meta["global"]["core:datatype"], "cf32_le");
        assert_eq!(meta["global"]["core:sample_rate"], 250_000.0);
        assert_eq!(meta["captures"][0]["core:frequency"], 433_920_000.0);
        assert_eq!(meta["annotations"][0]["core:sample_count"], 256);
        assert_eq!(meta["annotations"][0]["rfsweep:range"]["start"], 433_000_000);
    }

    #[test]
    fn sigmf_recorder_reports_unwritable_directory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let mut rec = SigMfRecorder::new(blocker.join("sub"), 16);
        let mut rx = SimulatedReceiver::new(0);
        let range = FrequencyRange::new(0, 1_000);

        let err = rec.record(&mut rx, &triggered(500), &range).unwrap_err();
        assert!(matches!(err, ScanError::Recording { .. }));
    }

    #[test]
    fn recorder_through_box_and_mut_ref() {
        let mut inner = NullRecorder;
        let by_ref: &mut dyn Recorder = &mut inner;
        let mut boxed: Box<dyn Recorder> = Box::new(NullRecorder);
        let mut rx = SimulatedReceiver::new(0);
        let range = FrequencyRange::new(0, 1_000);
        by_ref.record(&mut rx, &triggered(1), &range).unwrap();
        boxed.record(&mut rx, &triggered(1), &range).unwrap();
    }
}
