//! Resonance peak detection and free-spectral-range estimation.
//!
//! Detection runs on linear power (`10^(dB/10)`): a drop-port resonance that
//! rises 0.5 above its surroundings in linear transmission is a real
//! resonance, while the same rise in dB says little about its size.
//!
//! A sample is a candidate peak when it is a strict local maximum. Flat tops
//! resolve to their middle sample and the first/last samples never qualify.
//! The prominence of a candidate is its height above the higher of its two
//! bases, where a base is the lowest point reached walking outward before
//! hitting a strictly higher sample (or the array edge).

/// Default minimum prominence (linear transmission units).
pub const DEFAULT_PROMINENCE: f64 = 0.5;

/// Convert a dB sequence to linear power.
pub fn db_to_linear(transmission_db: &[f64]) -> Vec<f64> {
    transmission_db.iter().map(|&db| 10f64.powf(db / 10.0)).collect()
}

/// Peak indices of a dB spectrum, ascending.
pub fn detect_peaks(transmission_db: &[f64], min_prominence: f64) -> Vec<usize> {
    detect_peaks_linear(&db_to_linear(transmission_db), min_prominence)
}

/// Same as [`detect_peaks`] for a spectrum already in linear units.
pub fn detect_peaks_linear(transmission_lin: &[f64], min_prominence: f64) -> Vec<usize> {
    local_maxima(transmission_lin)
        .into_iter()
        .filter(|&peak| prominence(transmission_lin, peak) >= min_prominence)
        .collect()
}

/// Strict local maxima; plateaus report their middle index.
pub fn local_maxima(x: &[f64]) -> Vec<usize> {
    let n = x.len();
    let mut peaks = Vec::new();
    if n < 3 {
        return peaks;
    }

    let mut i = 1;
    let i_max = n - 1;
    while i < i_max {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < i_max && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                let left_edge = i;
                let right_edge = ahead - 1;
                peaks.push((left_edge + right_edge) / 2);
                i = ahead;
            }
        }
        i += 1;
    }

    peaks
}

/// Topographic prominence of `x[peak]`.
pub fn prominence(x: &[f64], peak: usize) -> f64 {
    let height = x[peak];

    let mut left_min = height;
    let mut i = peak;
    loop {
        if x[i] > height {
            break;
        }
        left_min = left_min.min(x[i]);
        if i == 0 {
            break;
        }
        i -= 1;
    }

    let mut right_min = height;
    for &v in &x[peak..] {
        if v > height {
            break;
        }
        right_min = right_min.min(v);
    }

    height - left_min.max(right_min)
}

/// Spacing from each peak to the next longer-wavelength peak.
///
/// The last entry is always `NaN`: the reddest resonance has no neighbour.
pub fn free_spectral_range(wavelength_nm: &[f64], peaks: &[usize]) -> Vec<f64> {
    let mut fsr: Vec<f64> = peaks
        .windows(2)
        .map(|pair| wavelength_nm[pair[1]] - wavelength_nm[pair[0]])
        .collect();
    if !peaks.is_empty() {
        fsr.push(f64::NAN);
    }
    fsr
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::data::synthetic::{lorentzian_comb_db, wavelength_grid};

    #[test]
    fn single_synthetic_resonance_yields_one_peak_at_center() {
        let wavelength = wavelength_grid(1549.0, 1551.0, 0.001);
        let db = lorentzian_comb_db(&wavelength, &[1550.0], 0.8, 0.05);

        let peaks = detect_peaks(&db, DEFAULT_PROMINENCE);
        assert_eq!(peaks.len(), 1);

        let closest = wavelength
            .iter()
            .enumerate()
            .min_by(|a, b| (a.1 - 1550.0).abs().total_cmp(&(b.1 - 1550.0).abs()))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peaks[0], closest);
    }

    #[test]
    fn two_resonances_report_fsr_then_nan() {
        let wavelength = wavelength_grid(1545.0, 1568.0, 0.001);
        let db = lorentzian_comb_db(&wavelength, &[1550.0, 1562.8], 0.8, 0.05);

        let peaks = detect_peaks(&db, DEFAULT_PROMINENCE);
        assert_eq!(peaks.len(), 2);

        let fsr = free_spectral_range(&wavelength, &peaks);
        assert_eq!(fsr.len(), 2);
        assert!((fsr[0] - 12.8).abs() < 1e-6, "fsr = {}", fsr[0]);
        assert!(fsr[1].is_nan());
    }

    #[test]
    fn low_prominence_bumps_are_ignored() {
        // Linear: 1.0, 1.2, 1.0, 3.0, 1.0 -> only the second bump clears 0.5.
        let linear = [1.0f64, 1.2, 1.0, 3.0, 1.0];
        let db: Vec<f64> = linear.iter().map(|v| 10.0 * v.log10()).collect();
        assert_eq!(detect_peaks(&db, 0.5), vec![3]);
    }

    #[test]
    fn plateau_reports_middle_and_edges_never_qualify() {
        assert_eq!(local_maxima(&[0.0, 1.0, 2.0, 2.0, 2.0, 1.0]), vec![3]);
        assert_eq!(local_maxima(&[5.0, 1.0, 0.0, 1.0, 5.0]), Vec::<usize>::new());
        // Plateau running into the edge is not a peak.
        assert_eq!(local_maxima(&[0.0, 1.0, 2.0, 2.0]), Vec::<usize>::new());
    }

    #[test]
    fn prominence_uses_higher_base() {
        // Left base 0.0, right base 1.0 (stopped by the 9.0), peak 4.0.
        let x = [0.0, 4.0, 1.0, 9.0, 0.0];
        assert!((prominence(&x, 1) - 3.0).abs() < 1e-12);
        assert!((prominence(&x, 3) - 9.0).abs() < 1e-12);
    }

    #[test]
    fn empty_peak_list_has_empty_fsr() {
        assert!(free_spectral_range(&[1.0, 2.0], &[]).is_empty());
    }

    proptest! {
        #[test]
        fn peaks_are_strictly_increasing_and_in_bounds(
            db in prop::collection::vec(-40.0f64..10.0, 0..200),
            threshold in 0.0f64..2.0,
        ) {
            let peaks = detect_peaks(&db, threshold);
            for pair in peaks.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
            for &p in &peaks {
                prop_assert!(p > 0 && p + 1 < db.len());
            }
        }

        #[test]
        fn fsr_last_is_nan_and_others_non_negative(
            db in prop::collection::vec(-40.0f64..10.0, 3..200),
        ) {
            let wavelength: Vec<f64> = (0..db.len()).map(|i| 1500.0 + i as f64 * 0.01).collect();
            let peaks = detect_peaks(&db, 0.0);
            let fsr = free_spectral_range(&wavelength, &peaks);
            prop_assert_eq!(fsr.len(), peaks.len());
            if let Some((last, rest)) = fsr.split_last() {
                prop_assert!(last.is_nan());
                for v in rest {
                    prop_assert!(*v >= 0.0);
                }
            }
        }
    }
}
