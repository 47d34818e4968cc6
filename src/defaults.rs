/// Compiled-in defaults for the scan pipeline.
///
/// Anything the configuration document can leave out, and the fixed
/// thresholds of the "auto" noise-floor estimate, live here.

/// Noise floor used by the "auto" estimate when the strongest candidate is
/// away from the tuned center, and the power reported for an empty sub-band.
pub const DEFAULT_NOISE_FLOOR: f64 = -100.0;

/// A top candidate within this distance of the tuned center (Hz) is treated
/// as the ambient noise reference by the "auto" estimate.
pub const AUTO_NOISE_CENTER_TOLERANCE_HZ: i64 = 1000;

/// Smallest magnitude fed to log10. Keeps empty bins finite.
pub const MAGNITUDE_FLOOR: f32 = 1e-12;

/// Number of candidates reported per pass when not configured
pub const DEFAULT_PRINT_BEST_FREQUENCIES: usize = 1;

/// Width of the separator line after a multi-candidate report
pub const SEPARATOR_WIDTH: usize = 80;

/// Directory for recordings when not configured
pub const DEFAULT_RECORDING_DIRECTORY: &str = "recordings";

/// Recording length in seconds of samples at the sweep sample rate, used
/// when `recording_samples` is not configured.
pub const DEFAULT_RECORDING_SECONDS: usize = 2;

/// Tuner gain mode keyword in the configuration document
pub const AUTO_KEYWORD: &str = "auto";

/// Highest frequency a 32-bit tuner register can hold (Hz). Also bounds the
/// bandwidth, which doubles as the sample rate.
pub const MAX_FREQUENCY_HZ: i64 = u32::MAX as i64;
