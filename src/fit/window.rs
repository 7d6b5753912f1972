//! Fit windows.
//!
//! Peak `i` gets a window centred on its index that reaches half the index
//! distance to peak `i + 1` on both sides. The last peak has no right
//! neighbour, so its window runs to the end of the array; on the left it
//! keeps half the distance to the previous peak (a lone peak uses the whole
//! sweep). Bounds are clamped to the array and the end is exclusive.

use std::ops::Range;

/// Sample range used to fit peak number `i` of `peaks` in an array of `len` samples.
pub fn fit_window(peaks: &[usize], i: usize, len: usize) -> Range<usize> {
    let peak = peaks[i];
    match peaks.get(i + 1) {
        Some(&next) => {
            let half = (next - peak) / 2;
            peak.saturating_sub(half)..(peak + half).min(len)
        }
        None => {
            let start = match i.checked_sub(1).map(|j| peaks[j]) {
                Some(prev) => peak - (peak - prev) / 2,
                None => 0,
            };
            start..len
        }
    }
}
