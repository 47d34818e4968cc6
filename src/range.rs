/// Frequency ranges and their reconciliation with the sweep bandwidth.
///
/// A sweep steps through each range in slices of exactly one bandwidth, so
/// every range must be a whole number of bandwidths wide. Ranges that are
/// not get their `stop` pushed up to the next boundary.
use core::fmt;

use serde::Serialize;

use crate::error::{ScanError, ScanResult};

/// A closed span of frequencies in Hz.
///
/// Used both for scan ranges and for ignored ranges. Ignored ranges are never
/// normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrequencyRange {
    pub start: i64,
    pub stop: i64,
}

/// Ignored ranges share the shape of scan ranges
pub type IgnoredRange = FrequencyRange;

impl FrequencyRange {
    pub const fn new(start: i64, stop: i64) -> Self {
        Self { start, stop }
    }

    pub const fn width(&self) -> i64 {
        self.stop - self.start
    }

    /// Inclusive on both ends.
    pub fn contains(&self, frequency: i64) -> bool {
        self.start <= frequency && frequency <= self.stop
    }

    /// Consecutive `(start, stop)` slices of `bandwidth` Hz from `start`
    /// up to (not including) `stop`.
    pub fn sub_bands(&self, bandwidth: i64) -> impl Iterator<Item = (i64, i64)> {
        let stop = self.stop;
        let step = bandwidth.max(1);
        let mut next = self.start;
        core::iter::from_fn(move || {
            if next < stop {
                let sub = (next, next + step);
                next += step;
                Some(sub)
            } else {
                None
            }
        })
    }
}

impl fmt::Display for FrequencyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}",
            FrequencyDisplay(self.start),
            FrequencyDisplay(self.stop)
        )
    }
}

/// Human-readable frequency ("433.920 MHz").
pub struct FrequencyDisplay(pub i64);

impl fmt::Display for FrequencyDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hz = self.0 as f64;
        let abs = hz.abs();
        if abs >= 1e9 {
            write!(f, "{:.3} GHz", hz / 1e9)
        } else if abs >= 1e6 {
            write!(f, "{:.3} MHz", hz / 1e6)
        } else if abs >= 1e3 {
            write!(f, "{:.3} kHz", hz / 1e3)
        } else {
            write!(f, "{} Hz", self.0)
        }
    }
}

/// Pad every range so its width is a whole multiple of `bandwidth`.
///
/// A range narrower than one bandwidth (including a zero-width one) becomes
/// exactly one bandwidth wide. Each adjustment is logged as a warning.
///
/// Fails if `ranges` is empty, if `bandwidth` is not positive, or if any
/// range has `start > stop`.
pub fn normalize_ranges(
    ranges: &[FrequencyRange],
    bandwidth: i64,
) -> ScanResult<Vec<FrequencyRange>> {
    if bandwidth <= 0 {
        return Err(ScanError::config(format!(
            "bandwidth must be positive, got {bandwidth}"
        )));
    }
    if ranges.is_empty() {
        log::error!("empty frequency ranges! quitting!");
        return Err(ScanError::config("empty frequency ranges"));
    }

    ranges
        .iter()
        .map(|range| normalize_range(*range, bandwidth))
        .collect()
}

fn normalize_range(range: FrequencyRange, bandwidth: i64) -> ScanResult<FrequencyRange> {
    if range.start > range.stop {
        return Err(ScanError::config(format!(
            "malformed frequency range {range}: start is above stop"
        )));
    }

    let width = range.width();
    if width != 0 && width % bandwidth == 0 {
        return Ok(range);
    }

    // ceil(width / bandwidth), at least one unit
    let units = (width / bandwidth + i64::from(width % bandwidth != 0)).max(1);
    let stop = bandwidth
        .checked_mul(units)
        .and_then(|padded| range.start.checked_add(padded))
        .ok_or_else(|| ScanError::config(format!("frequency range {range} cannot be padded")))?;
    let adjusted = FrequencyRange::new(range.start, stop);
    log::warn!(
        "frequency range: {} error! range not fit to bandwidth: {}! adjusting range end to {}!",
        range,
        FrequencyDisplay(bandwidth),
        FrequencyDisplay(adjusted.stop),
    );
    Ok(adjusted)
}
