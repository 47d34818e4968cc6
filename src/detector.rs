/// Noise-floor estimation and trigger decision for one sub-band.
///
/// Pure functions over a spectrum and its filtered candidates.
use core::fmt;
use core::str::FromStr;

use crate::defaults::{AUTO_KEYWORD, AUTO_NOISE_CENTER_TOLERANCE_HZ, DEFAULT_NOISE_FLOOR};
use crate::filter::Candidate;
use crate::spectrum::Spectrum;

/// Configured noise level.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum NoiseLevel {
    /// Estimate from the strongest candidate
    #[default]
    Auto,
    /// Fixed threshold in log-power units
    Fixed(f64),
}

impl FromStr for NoiseLevel {
    type Err = core::convert::Infallible;

    /// Numbers become `Fixed`. Anything else, including `"auto"`, is `Auto`;
    /// unrecognized words are logged.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(value) = s.parse::<f64>() {
            return Ok(NoiseLevel::Fixed(value));
        }
        if !s.eq_ignore_ascii_case(AUTO_KEYWORD) {
            log::warn!("noise level '{}' is not a number, using auto", s);
        }
        Ok(NoiseLevel::Auto)
    }
}

impl fmt::Display for NoiseLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoiseLevel::Auto => f.write_str(AUTO_KEYWORD),
            NoiseLevel::Fixed(v) => write!(f, "{v}"),
        }
    }
}

/// Strongest signal of a sub-band and whether it clears the noise floor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestSignal {
    pub frequency: i64,
    pub power: f64,
    pub noise_level: f64,
    pub triggered: bool,
}

impl BestSignal {
    /// Result for a sub-band with no candidates.
    pub const fn empty() -> Self {
        Self {
            frequency: 0,
            power: DEFAULT_NOISE_FLOOR,
            noise_level: DEFAULT_NOISE_FLOOR,
            triggered: false,
        }
    }
}

/// Resolve the noise floor for a sub-band.
///
/// `Auto` takes the top candidate's power when that candidate sits within
/// [`AUTO_NOISE_CENTER_TOLERANCE_HZ`] of the tuned center, and
/// [`DEFAULT_NOISE_FLOOR`] otherwise.
pub fn noise_floor(spectrum: &Spectrum, candidates: &[Candidate], level: NoiseLevel) -> f64 {
    match level {
        NoiseLevel::Fixed(value) => value,
        NoiseLevel::Auto => match candidates.first() {
            Some(top)
                if (top.frequency - spectrum.center).abs() <= AUTO_NOISE_CENTER_TOLERANCE_HZ =>
            {
                top.power
            }
            _ => DEFAULT_NOISE_FLOOR,
        },
    }
}

/// Pick the top candidate and decide whether it triggers.
///
/// `candidates` must be ordered by descending power, as produced by
/// [`filter_frequencies`](crate::filter::filter_frequencies). The trigger
/// fires only when the power is strictly above the floor.
pub fn detect_best_signal(
    spectrum: &Spectrum,
    candidates: &[Candidate],
    level: NoiseLevel,
) -> BestSignal {
    let Some(top) = candidates.first() else {
        return BestSignal::empty();
    };

    let noise_level = noise_floor(spectrum, candidates, level);
    BestSignal {
        frequency: top.frequency,
        power: top.power,
        noise_level,
        triggered: noise_level < top.power,
    }
}
