/// Scan configuration document.
///
/// The document is JSON, usually written by a web form, so any number may
/// arrive as a float (`2.4e6`) or as a numeric string (`"-50"`). It is read
/// into a permissive wire struct first and then validated into
/// [`ScanConfig`].
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::defaults::{
    AUTO_KEYWORD, DEFAULT_PRINT_BEST_FREQUENCIES, DEFAULT_RECORDING_DIRECTORY,
    DEFAULT_RECORDING_SECONDS, MAX_FREQUENCY_HZ,
};
use crate::detector::NoiseLevel;
use crate::device::TunerGain;
use crate::error::{ScanError, ScanResult};
use crate::range::FrequencyRange;

/// Validated scan parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    pub frequencies_ranges: Vec<FrequencyRange>,
    pub ignored_frequencies_ranges: Vec<FrequencyRange>,
    /// Sub-band width and sample rate (Hz)
    pub bandwidth: i64,
    /// Samples captured per sub-band
    pub samples: usize,
    /// Transform size
    pub fft: usize,
    pub ppm_error: i32,
    pub tuner_gain: TunerGain,
    /// Candidates kept per sub-band and reported per pass (at least 1)
    pub print_best_frequencies: usize,
    /// Only report a pass when something triggered
    pub filter_best_frequencies: bool,
    pub disable_recording: bool,
    pub noise_level: NoiseLevel,
    pub recording_directory: PathBuf,
    pub recording_samples: usize,
}

/// A number or a string, as web forms send either.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
enum RawValue {
    Number(f64),
    Text(String),
}

impl RawValue {
    /// The value of a field that must be numeric.
    fn number(&self, name: &str) -> ScanResult<f64> {
        match self {
            RawValue::Number(v) => Ok(*v),
            RawValue::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| ScanError::config(format!("{name} is not a number: '{text}'"))),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
struct RawRange {
    start: RawValue,
    stop: RawValue,
}

/// Wire format of the configuration document. Unknown keys are ignored.
#[derive(Deserialize, Debug)]
struct RawConfig {
    frequencies_ranges: Vec<RawRange>,
    #[serde(default)]
    ignored_frequencies_ranges: Vec<RawRange>,
    bandwidth: RawValue,
    samples: RawValue,
    fft: RawValue,
    #[serde(default)]
    ppm_error: Option<RawValue>,
    #[serde(default)]
    tuner_gain: Option<RawValue>,
    #[serde(default)]
    print_best_frequencies: Option<RawValue>,
    #[serde(default)]
    filter_best_frequencies: bool,
    #[serde(default)]
    disable_recording: bool,
    #[serde(default)]
    noise_level: Option<RawValue>,
    #[serde(default)]
    recording_directory: Option<PathBuf>,
    #[serde(default)]
    recording_samples: Option<RawValue>,
}

impl ScanConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(text: &str) -> ScanResult<Self> {
        let raw: RawConfig = serde_json::from_str(text)
            .map_err(|e| ScanError::config(format!("invalid json config: {e}")))?;
        Self::try_from(raw)
    }

    /// Read, parse, and validate a JSON document from disk.
    pub fn load(path: &Path) -> ScanResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            ScanError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }
}

impl TryFrom<RawConfig> for ScanConfig {
    type Error = ScanError;

    fn try_from(raw: RawConfig) -> ScanResult<Self> {
        let bandwidth = positive("bandwidth", raw.bandwidth.number("bandwidth")?)?;
        if bandwidth > MAX_FREQUENCY_HZ {
            return Err(ScanError::config(format!(
                "bandwidth {bandwidth} Hz is not a valid sample rate"
            )));
        }
        let samples = positive("samples", raw.samples.number("samples")?)? as usize;
        let fft = positive("fft", raw.fft.number("fft")?)? as usize;

        let frequencies_ranges = ranges("frequencies_ranges", &raw.frequencies_ranges)?;
        let ignored_frequencies_ranges =
            ranges("ignored_frequencies_ranges", &raw.ignored_frequencies_ranges)?;

        let ppm_error = match raw.ppm_error {
            Some(v) => i32::try_from(integer("ppm_error", v.number("ppm_error")?)?)
                .map_err(|_| ScanError::config(format!("ppm_error out of range: {v:?}")))?,
            None => 0,
        };

        let print_best_frequencies = match raw.print_best_frequencies {
            Some(v) => {
                let n = integer("print_best_frequencies", v.number("print_best_frequencies")?)?;
                n.max(1) as usize
            }
            None => DEFAULT_PRINT_BEST_FREQUENCIES,
        };

        let recording_samples = match raw.recording_samples {
            Some(v) => positive("recording_samples", v.number("recording_samples")?)? as usize,
            None => bandwidth as usize * DEFAULT_RECORDING_SECONDS,
        };

        Ok(Self {
            frequencies_ranges,
            ignored_frequencies_ranges,
            bandwidth,
            samples,
            fft,
            ppm_error,
            tuner_gain: tuner_gain(raw.tuner_gain)?,
            print_best_frequencies,
            filter_best_frequencies: raw.filter_best_frequencies,
            disable_recording: raw.disable_recording,
            noise_level: noise_level(raw.noise_level),
            recording_directory: raw
                .recording_directory
                .unwrap_or_else(|| PathBuf::from(DEFAULT_RECORDING_DIRECTORY)),
            recording_samples,
        })
    }
}

fn integer(name: &str, value: f64) -> ScanResult<i64> {
    if !value.is_finite() || value.abs() > i64::MAX as f64 {
        return Err(ScanError::config(format!("{name} is not a number: {value}")));
    }
    Ok(value.round() as i64)
}

fn positive(name: &str, value: f64) -> ScanResult<i64> {
    let v = integer(name, value)?;
    if v <= 0 {
        return Err(ScanError::config(format!("{name} must be positive, got {value}")));
    }
    Ok(v)
}

/// A frequency the tuner can reach.
fn frequency(name: &str, value: &RawValue) -> ScanResult<i64> {
    let hz = integer(name, value.number(name)?)?;
    if !(0..=MAX_FREQUENCY_HZ).contains(&hz) {
        return Err(ScanError::config(format!(
            "{name}: {hz} Hz is outside 0..={MAX_FREQUENCY_HZ} Hz"
        )));
    }
    Ok(hz)
}

fn ranges(name: &str, raw: &[RawRange]) -> ScanResult<Vec<FrequencyRange>> {
    raw.iter()
        .map(|r| {
            let start = frequency(name, &r.start)?;
            let range = FrequencyRange::new(start, frequency(name, &r.stop)?);
            if range.start > range.stop {
                return Err(ScanError::config(format!(
                    "malformed range in {name}: {range}"
                )));
            }
            Ok(range)
        })
        .collect()
}

fn tuner_gain(raw: Option<RawValue>) -> ScanResult<TunerGain> {
    match raw {
        None => Ok(TunerGain::Auto),
        Some(RawValue::Number(db)) if db.is_finite() => Ok(TunerGain::Manual(db)),
        Some(RawValue::Number(db)) => {
            Err(ScanError::config(format!("tuner_gain is not a number: {db}")))
        }
        Some(RawValue::Text(text)) => {
            let text = text.trim();
            if text.eq_ignore_ascii_case(AUTO_KEYWORD) {
                Ok(TunerGain::Auto)
            } else {
                text.parse::<f64>()
                    .ok()
                    .filter(|db| db.is_finite())
                    .map(TunerGain::Manual)
                    .ok_or_else(|| ScanError::config(format!("invalid tuner_gain: '{text}'")))
            }
        }
    }
}

fn noise_level(raw: Option<RawValue>) -> NoiseLevel {
    match raw {
        None => NoiseLevel::Auto,
        Some(RawValue::Number(v)) => NoiseLevel::Fixed(v),
        Some(RawValue::Text(text)) => match text.parse::<NoiseLevel>() {
            Ok(level) => level,
            Err(never) => match never {},
        },
    }
}
