/// Candidate selection for one spectrum.
///
/// Ranks bins by power and keeps the strongest ones that fall outside every
/// ignored range. Thresholding is left to the detector.
use crate::range::IgnoredRange;
use crate::spectrum::Spectrum;

/// One bin that survived filtering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub frequency: i64,
    pub power: f64,
}

impl Candidate {
    pub const fn new(frequency: i64, power: f64) -> Self {
        Self { frequency, power }
    }
}

/// True if `frequency` lies outside every ignored range (bounds inclusive).
pub fn is_frequency_ok(frequency: i64, ignored: &[IgnoredRange]) -> bool {
    !ignored.iter().any(|range| range.contains(frequency))
}

/// Up to `count` strongest bins of `spectrum` not covered by `ignored`.
///
/// `count` is floored to 1. Output is ordered by descending power; equal
/// powers keep their bin order, so the result is deterministic.
pub fn filter_frequencies(
    spectrum: &Spectrum,
    ignored: &[IgnoredRange],
    count: usize,
) -> Vec<Candidate> {
    let count = count.max(1);
    let powers = &spectrum.powers;

    let mut order: Vec<usize> = (0..powers.len()).collect();
    order.sort_by(|&a, &b| powers[b].total_cmp(&powers[a]));

    order
        .into_iter()
        .map(|i| Candidate::new(spectrum.frequencies[i], powers[i]))
        .filter(|c| is_frequency_ok(c.frequency, ignored))
        .take(count)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::FrequencyRange;

    fn spectrum(bins: &[(i64, f64)]) -> Spectrum {
        Spectrum {
            center: bins.get(bins.len() / 2).map(|b| b.0).unwrap_or(0),
            frequencies: bins.iter().map(|b| b.0).collect(),
            powers: bins.iter().map(|b| b.1).collect(),
        }
    }

    // ── ignore ranges ───────────────────────────────────────────────

    #[test]
    fn global_max_inside_ignored_range_is_excluded() {
        let s = spectrum(&[(50, 1.0), (150, 9.0), (250, 2.0)]);
        let ignored = [FrequencyRange::new(100, 200)];
        let out = filter_frequencies(&s, &ignored, 3);
        assert!(out.iter().all(|c| c.frequency != 150));
        assert_eq!(out[0], Candidate::new(250, 2.0));
    }

    #[test]
    fn ignored_bounds_are_inclusive() {
        let s = spectrum(&[(99, 1.0), (100, 5.0), (200, 5.0), (201, 2.0)]);
        let ignored = [FrequencyRange::new(100, 200)];
        let out = filter_frequencies(&s, &ignored, 4);
        let freqs: Vec<i64> = out.iter().map(|c| c.frequency).collect();
        assert_eq!(freqs, vec![201, 99]);
    }

    #[test]
    fn several_ignored_ranges() {
        let s = spectrum(&[(10, 3.0), (20, 2.0), (30, 1.0)]);
        let ignored = [FrequencyRange::new(5, 15), FrequencyRange::new(25, 35)];
        let out = filter_frequencies(&s, &ignored, 3);
        assert_eq!(out, vec![Candidate::new(20, 2.0)]);
    }

    #[test]
    fn everything_ignored_yields_empty() {
        let s = spectrum(&[(10, 3.0), (20, 2.0)]);
        let ignored = [FrequencyRange::new(0, 100)];
        assert!(filter_frequencies(&s, &ignored, 5).is_empty());
    }

    #[test]
    fn is_frequency_ok_without_ignores() {
        assert!(is_frequency_ok(123, &[]));
    }

    // ── ranking ─────────────────────────────────────────────────────

    #[test]
    fn returns_at_most_n_in_non_increasing_power() {
        let bins: Vec<(i64, f64)> = (0..50).map(|i| (i * 10, ((i * 37) % 11) as f64)).collect();
        let s = spectrum(&bins);
        for n in 1..8 {
            let out = filter_frequencies(&s, &[], n);
            assert!(out.len() <= n);
            assert!(out.windows(2).all(|w| w[0].power >= w[1].power));
        }
    }

    #[test]
    fn zero_count_is_floored_to_one() {
        let s = spectrum(&[(1, 1.0), (2, 2.0)]);
        let out = filter_frequencies(&s, &[], 0);
        assert_eq!(out, vec![Candidate::new(2, 2.0)]);
    }

    #[test]
    fn fewer_bins_than_requested() {
        let s = spectrum(&[(1, 1.0), (2, 2.0)]);
        assert_eq!(filter_frequencies(&s, &[], 10).len(), 2);
    }

    #[test]
    fn ties_are_deterministic() {
        let s = spectrum(&[(1, 4.0), (2, 4.0), (3, 4.0), (4, 1.0)]);
        let a = filter_frequencies(&s, &[], 2);
        let b = filter_frequencies(&s, &[], 2);
        assert_eq!(a, b);
        assert_eq!(a, vec![Candidate::new(1, 4.0), Candidate::new(2, 4.0)]);
    }

    #[test]
    fn empty_spectrum_yields_empty() {
        let s = spectrum(&[]);
        assert!(filter_frequencies(&s, &[], 3).is_empty());
    }
}
